//! Shared fakes for supervisor, reconnection, and worker-loop tests.
//!
//! `FakeLauncher` stands in for the OS: every launch hands out a process
//! whose exit the test triggers by hand, and whose signals either end it
//! (like a well-behaved worker) or are ignored (like a stuck one).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use squadron::config::SupervisorConfig;
use squadron::models::disconnect::WorkerSettings;
use squadron::models::status::StatusReport;
use squadron::skills::dry_run::DryRunSkills;
use squadron::skills::{SkillLibrary, WorldEvent, WorldSession};
use squadron::supervisor::process::{
    LaunchRequest, ProcessSignals, SpawnedWorker,
};
use squadron::supervisor::policy::{ExitInfo, INTERRUPT_SIGNAL};
use squadron::supervisor::{
    Launcher, ProcessRegistry, SupervisorContext, SupervisorEvent, WorkerFactory,
};
use squadron::{AppError, Result};

/// Signal number reported for a forced kill.
pub const KILL_SIGNAL: i32 = 9;

/// One launched fake process.
#[derive(Debug)]
pub struct FakeProcess {
    pub pid: u32,
    pub request: LaunchRequest,
    exit_tx: Mutex<Option<oneshot::Sender<ExitInfo>>>,
    interrupts: AtomicU32,
    killed: AtomicBool,
}

impl FakeProcess {
    /// End the process with `info`; later calls are ignored.
    pub fn exit(&self, info: ExitInfo) {
        if let Some(tx) = self.exit_tx.lock().unwrap().take() {
            let _ = tx.send(info);
        }
    }

    pub fn interrupts(&self) -> u32 {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct FakeSignals {
    process: Arc<FakeProcess>,
    obey_interrupt: bool,
}

impl ProcessSignals for FakeSignals {
    fn interrupt(&self) -> Result<()> {
        self.process.interrupts.fetch_add(1, Ordering::SeqCst);
        if self.obey_interrupt {
            self.process.exit(ExitInfo::signalled(INTERRUPT_SIGNAL));
        }
        Ok(())
    }

    fn kill(&self) -> Result<()> {
        self.process.killed.store(true, Ordering::SeqCst);
        self.process.exit(ExitInfo::signalled(KILL_SIGNAL));
        Ok(())
    }
}

/// Launcher producing [`FakeProcess`]es.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    next_pid: AtomicU32,
    fail: AtomicBool,
    ignore_interrupt: AtomicBool,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        })
    }

    /// Make every following launch fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Processes launched from now on ignore the intentional-stop signal.
    pub fn set_ignore_interrupt(&self, ignore: bool) {
        self.ignore_interrupt.store(ignore, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.processes.lock().unwrap().len()
    }

    pub fn process(&self, index: usize) -> Arc<FakeProcess> {
        Arc::clone(&self.processes.lock().unwrap()[index])
    }

    pub fn latest(&self) -> Arc<FakeProcess> {
        Arc::clone(self.processes.lock().unwrap().last().expect("no launches yet"))
    }

    /// Latest process launched for `worker`.
    pub fn latest_for(&self, worker: &str) -> Option<Arc<FakeProcess>> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|process| process.request.settings.name == worker)
            .cloned()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<SpawnedWorker> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Process("launch refused".into()));
        }
        let (exit_tx, exit_rx) = oneshot::channel();
        let process = Arc::new(FakeProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            request: request.clone(),
            exit_tx: Mutex::new(Some(exit_tx)),
            interrupts: AtomicU32::new(0),
            killed: AtomicBool::new(false),
        });
        self.processes.lock().unwrap().push(Arc::clone(&process));

        let signals = Arc::new(FakeSignals {
            process: Arc::clone(&process),
            obey_interrupt: !self.ignore_interrupt.load(Ordering::SeqCst),
        });
        Ok(SpawnedWorker {
            pid: Some(process.pid),
            exit: Box::pin(async move { exit_rx.await.unwrap_or_default() }),
            signals,
        })
    }
}

/// Supervisor policy used by the tests: 5 s crash-loop floor, 3 s grace.
pub fn test_policy() -> SupervisorConfig {
    SupervisorConfig {
        crash_loop_floor_seconds: 5,
        stop_grace_seconds: 3,
    }
}

/// Supervisor context around `launcher`, with its event receiver.
pub fn supervisor_context(
    launcher: Arc<FakeLauncher>,
) -> (SupervisorContext, mpsc::UnboundedReceiver<SupervisorEvent>) {
    let (events, rx) = mpsc::unbounded_channel();
    let ctx = SupervisorContext {
        launcher,
        registry: Arc::new(ProcessRegistry::new()),
        program: PathBuf::from("squadron-worker"),
        endpoint: "squadron-test".into(),
        config_path: None,
        policy: test_policy(),
        events,
    };
    (ctx, rx)
}

/// Factory recording every recreation request.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    created: Mutex<Vec<WorkerSettings>>,
    fail: AtomicBool,
}

impl RecordingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|settings| settings.name.clone())
            .collect()
    }
}

impl WorkerFactory for RecordingFactory {
    fn create_worker<'a>(
        &'a self,
        settings: &'a WorkerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        self.created.lock().unwrap().push(settings.clone());
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(AppError::Process("factory refused".into()))
        } else {
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }
}

/// World session over dry-run skills whose events the test injects.
pub fn scripted_session(step: Duration) -> (WorldSession, Arc<DryRunSkills>, mpsc::Sender<WorldEvent>) {
    let (events_tx, events) = mpsc::channel(16);
    let skills = Arc::new(DryRunSkills::new(step));
    let library: Arc<dyn SkillLibrary> = Arc::clone(&skills) as Arc<dyn SkillLibrary>;
    (
        WorldSession {
            skills: library,
            events,
        },
        skills,
        events_tx,
    )
}

/// JSON object arguments from a `json!` literal.
pub fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object args")
}

/// Next report, failing the test if none arrives within a minute of
/// (possibly paused) time.
pub async fn next_report(rx: &mut mpsc::Receiver<StatusReport>) -> StatusReport {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a status report")
        .expect("status channel closed")
}

/// Next supervisor event within a minute of (possibly paused) time.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> SupervisorEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a supervisor event")
        .expect("event channel closed")
}
