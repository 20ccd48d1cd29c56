//! Worker process supervision.
//!
//! A [`ProcessSupervisor`] owns one worker's OS process. It launches the
//! worker through a [`Launcher`], watches for the exit on a background
//! task, and applies the restart policy from [`super::policy`]. Exits are
//! published as [`SupervisorEvent`]s so the leader can react.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use super::policy::{decide, ExitDecision, ExitInfo};
use super::registry::ProcessRegistry;
use crate::config::SupervisorConfig;
use crate::models::disconnect::WorkerSettings;
use crate::{AppError, Result};

/// Init message passed to a worker that is started again.
pub const RESTART_MESSAGE: &str = "Worker restarted.";

/// Everything a launcher needs to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Worker executable.
    pub program: PathBuf,
    /// Identity and launch options.
    pub settings: WorkerSettings,
    /// Leader endpoint the worker connects to.
    pub endpoint: String,
    /// Config file forwarded to the worker.
    pub config_path: Option<PathBuf>,
}

impl LaunchRequest {
    /// Command-line arguments for the worker executable.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--name".to_owned(),
            self.settings.name.clone(),
            "--leader".to_owned(),
            self.settings.leader.clone(),
            "--count-id".to_owned(),
            self.settings.count_id.to_string(),
        ];
        if let Some(message) = &self.settings.init_message {
            args.push("--init-message".to_owned());
            args.push(message.clone());
        }
        args.push("--endpoint".to_owned());
        args.push(self.endpoint.clone());
        if let Some(path) = &self.config_path {
            args.push("--config".to_owned());
            args.push(path.display().to_string());
        }
        args
    }
}

/// Signals that can be delivered to a launched process.
pub trait ProcessSignals: Send + Sync {
    /// Deliver the intentional-stop signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the signal cannot be delivered.
    fn interrupt(&self) -> Result<()>;

    /// Terminate the process unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process cannot be killed.
    fn kill(&self) -> Result<()>;
}

/// Future resolving when the launched process exits.
pub type ExitFuture = Pin<Box<dyn Future<Output = ExitInfo> + Send>>;

/// A freshly launched worker process.
pub struct SpawnedWorker {
    /// OS process id, when known.
    pub pid: Option<u32>,
    /// Resolves with the exit status.
    pub exit: ExitFuture,
    /// Signal handle for the process.
    pub signals: Arc<dyn ProcessSignals>,
}

/// Starts worker processes.
pub trait Launcher: Send + Sync {
    /// Launch a worker described by `request`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process cannot be spawned.
    fn launch(&self, request: &LaunchRequest) -> Result<SpawnedWorker>;
}

/// Launches workers as child processes that inherit the leader's output.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl Launcher for OsLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<SpawnedWorker> {
        let mut cmd = Command::new(&request.program);
        cmd.args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Process(format!(
                "failed to spawn worker '{}' with '{}': {err}",
                request.settings.name,
                request.program.display()
            ))
        })?;
        let pid = child.id();

        let exit: ExitFuture = Box::pin(async move {
            match child.wait().await {
                Ok(status) => ExitInfo::from_status(status),
                Err(err) => {
                    warn!(%err, "failed to wait for worker process");
                    ExitInfo::default()
                }
            }
        });

        Ok(SpawnedWorker {
            pid,
            exit,
            signals: Arc::new(PidSignals { pid }),
        })
    }
}

#[derive(Debug)]
struct PidSignals {
    pid: Option<u32>,
}

impl PidSignals {
    #[cfg(unix)]
    fn send(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| AppError::Process("process has no pid".into()))?;
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Process(format!("pid {pid} out of range")))?;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), signal)
            .map_err(|err| AppError::Process(format!("failed to signal pid {pid}: {err}")))
    }
}

impl ProcessSignals for PidSignals {
    #[cfg(unix)]
    fn interrupt(&self) -> Result<()> {
        self.send(nix::sys::signal::Signal::SIGINT)
    }

    #[cfg(unix)]
    fn kill(&self) -> Result<()> {
        self.send(nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> Result<()> {
        Err(AppError::Process(
            "intentional-stop signal is not supported on this platform".into(),
        ))
    }

    #[cfg(not(unix))]
    fn kill(&self) -> Result<()> {
        Err(AppError::Process(
            "kill by pid is not supported on this platform".into(),
        ))
    }
}

/// Notifications published by supervisors.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// A worker process exited.
    Exited {
        /// Worker name.
        worker: String,
        /// How it exited.
        exit: ExitInfo,
        /// What the supervisor decided.
        decision: ExitDecision,
    },
    /// A worker crashed again too soon; automatic restarts are suspended.
    CrashLoop {
        /// Settings to recreate the worker with.
        settings: WorkerSettings,
    },
    /// An automatic restart could not launch the worker.
    RestartFailed {
        /// Settings to recreate the worker with.
        settings: WorkerSettings,
        /// Launch error.
        error: String,
    },
}

/// Dependencies shared by every supervisor of a leader.
#[derive(Clone)]
pub struct SupervisorContext {
    /// Process launcher.
    pub launcher: Arc<dyn Launcher>,
    /// Registry of live processes.
    pub registry: Arc<ProcessRegistry>,
    /// Worker executable.
    pub program: PathBuf,
    /// Leader endpoint passed to workers.
    pub endpoint: String,
    /// Config file forwarded to workers.
    pub config_path: Option<PathBuf>,
    /// Restart policy knobs.
    pub policy: SupervisorConfig,
    /// Where exit events go.
    pub events: mpsc::UnboundedSender<SupervisorEvent>,
}

struct Live {
    generation: u64,
    pid: Option<u32>,
    signals: Arc<dyn ProcessSignals>,
}

#[derive(Default)]
struct SupervisorState {
    live: Option<Live>,
    generation: u64,
    last_start: Option<Instant>,
    stop_requested: bool,
    count_id: u32,
    init_message: Option<String>,
}

/// Supervises the OS process of one worker.
pub struct ProcessSupervisor {
    name: String,
    leader: String,
    ctx: SupervisorContext,
    state: Mutex<SupervisorState>,
    exited: Notify,
}

impl ProcessSupervisor {
    /// Supervisor for worker `name` serving `leader`; nothing is started.
    #[must_use]
    pub fn new(name: impl Into<String>, leader: impl Into<String>, ctx: SupervisorContext) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            leader: leader.into(),
            ctx,
            state: Mutex::new(SupervisorState::default()),
            exited: Notify::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker process is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().live.is_some()
    }

    /// Pid of the live process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.state().live.as_ref().and_then(|live| live.pid)
    }

    /// Count id of the latest launch.
    #[must_use]
    pub fn count_id(&self) -> u32 {
        self.state().count_id
    }

    /// Settings of the latest launch, for handing the worker to reconnection.
    #[must_use]
    pub fn settings(&self) -> WorkerSettings {
        let state = self.state();
        self.settings_with(state.init_message.clone(), state.count_id)
    }

    fn settings_with(&self, init_message: Option<String>, count_id: u32) -> WorkerSettings {
        WorkerSettings {
            name: self.name.clone(),
            leader: self.leader.clone(),
            count_id,
            init_message,
        }
    }

    /// Launch the worker process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the worker is already running or the
    /// launch fails.
    pub fn start(self: &Arc<Self>, init_message: Option<&str>, count_id: u32) -> Result<()> {
        let mut state = self.state();
        if state.live.is_some() {
            return Err(AppError::Process(format!(
                "worker '{}' is already running",
                self.name
            )));
        }
        self.launch_locked(&mut state, init_message.map(str::to_owned), count_id)
    }

    fn launch_locked(
        self: &Arc<Self>,
        state: &mut SupervisorState,
        init_message: Option<String>,
        count_id: u32,
    ) -> Result<()> {
        let request = LaunchRequest {
            program: self.ctx.program.clone(),
            settings: self.settings_with(init_message.clone(), count_id),
            endpoint: self.ctx.endpoint.clone(),
            config_path: self.ctx.config_path.clone(),
        };
        let spawned = self.ctx.launcher.launch(&request)?;

        state.generation += 1;
        let generation = state.generation;
        state.live = Some(Live {
            generation,
            pid: spawned.pid,
            signals: spawned.signals,
        });
        state.last_start = Some(Instant::now());
        state.stop_requested = false;
        state.count_id = count_id;
        state.init_message = init_message;
        self.ctx.registry.register(&self.name, spawned.pid);
        info!(worker = self.name, pid = ?spawned.pid, count_id, "worker process started");

        let this = Arc::clone(self);
        let exit = spawned.exit;
        let span = info_span!("worker_process", worker = %self.name, generation);
        tokio::spawn(
            async move {
                let info = exit.await;
                this.handle_exit(generation, info);
            }
            .instrument(span),
        );
        Ok(())
    }

    fn handle_exit(self: &Arc<Self>, generation: u64, exit: ExitInfo) {
        let mut events = Vec::new();
        {
            let mut state = self.state();
            let current = state
                .live
                .as_ref()
                .is_some_and(|live| live.generation == generation);
            if !current {
                return;
            }
            let pid = state.live.take().and_then(|live| live.pid);
            self.ctx.registry.deregister(&self.name, pid);

            let since_start = state
                .last_start
                .map_or(Duration::MAX, |started| started.elapsed());
            let decision = decide(
                exit,
                state.stop_requested,
                since_start,
                self.ctx.policy.crash_loop_floor(),
            );
            state.stop_requested = false;
            info!(worker = self.name, %exit, ?decision, "worker process exited");
            events.push(SupervisorEvent::Exited {
                worker: self.name.clone(),
                exit,
                decision,
            });

            match decision {
                ExitDecision::TaskEnded => info!(worker = self.name, "worker ending task"),
                ExitDecision::Intentional | ExitDecision::Clean => {}
                ExitDecision::CrashLoop => {
                    warn!(
                        worker = self.name,
                        ?since_start,
                        "worker exited too quickly, not restarting"
                    );
                    events.push(SupervisorEvent::CrashLoop {
                        settings: self.settings_with(state.init_message.clone(), state.count_id),
                    });
                }
                ExitDecision::Restart => {
                    info!(worker = self.name, "restarting worker");
                    let count_id = state.count_id;
                    if let Err(err) =
                        self.launch_locked(&mut state, Some(RESTART_MESSAGE.to_owned()), count_id)
                    {
                        warn!(worker = self.name, %err, "restart failed");
                        events.push(SupervisorEvent::RestartFailed {
                            settings: self
                                .settings_with(Some(RESTART_MESSAGE.to_owned()), count_id),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        self.exited.notify_waiters();
        for event in events {
            // The leader may already be gone during shutdown.
            let _ = self.ctx.events.send(event);
        }
    }

    /// Send the intentional-stop signal; a no-op when nothing runs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the signal cannot be delivered.
    pub fn stop(&self) -> Result<()> {
        let signals = {
            let mut state = self.state();
            let Some(signals) = state.live.as_ref().map(|live| Arc::clone(&live.signals)) else {
                return Ok(());
            };
            state.stop_requested = true;
            signals
        };
        info!(worker = self.name, "stopping worker");
        signals.interrupt()
    }

    /// Stop the worker, wait for it to exit, and start it again.
    ///
    /// Waits `stop_grace` for the exit before warning and killing the
    /// process. A worker that is not running is started directly.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process never exits or the new
    /// launch fails.
    pub async fn force_restart(self: &Arc<Self>) -> Result<()> {
        let notified = self.exited.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let signals = {
            let mut state = self.state();
            match state.live.as_ref().map(|live| Arc::clone(&live.signals)) {
                None => {
                    let count_id = state.count_id;
                    info!(worker = self.name, "worker not running, starting it");
                    return self.launch_locked(
                        &mut state,
                        Some(RESTART_MESSAGE.to_owned()),
                        count_id,
                    );
                }
                Some(signals) => {
                    state.stop_requested = true;
                    signals
                }
            }
        };

        if let Err(err) = signals.interrupt() {
            warn!(worker = self.name, %err, "failed to interrupt worker");
        }

        let grace = self.ctx.policy.stop_grace();
        if tokio::time::timeout(grace, notified.as_mut()).await.is_err() {
            warn!(worker = self.name, ?grace, "worker did not stop in time, killing it");
            signals.kill()?;
            tokio::time::timeout(grace, notified.as_mut())
                .await
                .map_err(|_| {
                    AppError::Process(format!("worker '{}' did not exit after kill", self.name))
                })?;
        }

        info!(worker = self.name, "stopped worker, now restarting");
        let mut state = self.state();
        if state.live.is_some() {
            return Err(AppError::Process(format!(
                "worker '{}' was started concurrently",
                self.name
            )));
        }
        let count_id = state.count_id;
        self.launch_locked(&mut state, Some(RESTART_MESSAGE.to_owned()), count_id)
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("name", &self.name)
            .field("leader", &self.leader)
            .finish_non_exhaustive()
    }
}
