//! Leader context.
//!
//! A [`Leader`] owns everything a leader process needs: the [`LeaderHub`]
//! routing commands, one [`ProcessSupervisor`] per worker, the process
//! registry, the [`ReconnectionCoordinator`], and the status [`Roster`].
//! Several leaders can live in one process; nothing here is global.

pub mod http;
pub mod roster;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::command::CommandMessage;
use crate::models::disconnect::WorkerSettings;
use crate::models::identity::{validate_name, AgentIdentity};
use crate::models::status::{StatusKind, StatusReport};
use crate::supervisor::{
    Launcher, ProcessRegistry, ProcessSupervisor, ReconnectStatus, ReconnectionCoordinator,
    SupervisorContext, SupervisorEvent, WorkerFactory,
};
use crate::transport::server::spawn_hub_server;
use crate::transport::LeaderHub;
use crate::{AppError, Result};

use self::http::StatusBody;
use self::roster::{Roster, WorkerView};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Supervisors of one leader, created on demand.
struct SupervisorSet {
    leader: String,
    ctx: SupervisorContext,
    by_name: Mutex<BTreeMap<String, Arc<ProcessSupervisor>>>,
}

impl SupervisorSet {
    fn by_name(&self) -> MutexGuard<'_, BTreeMap<String, Arc<ProcessSupervisor>>> {
        self.by_name.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, name: &str) -> Option<Arc<ProcessSupervisor>> {
        self.by_name().get(name).cloned()
    }

    fn get_or_create(&self, name: &str) -> Arc<ProcessSupervisor> {
        Arc::clone(self.by_name().entry(name.to_owned()).or_insert_with(|| {
            ProcessSupervisor::new(name, self.leader.clone(), self.ctx.clone())
        }))
    }

    fn all(&self) -> Vec<Arc<ProcessSupervisor>> {
        self.by_name().values().cloned().collect()
    }
}

/// Recreates lost workers by starting their supervisors again.
struct SupervisorFactory {
    supervisors: Arc<SupervisorSet>,
}

impl WorkerFactory for SupervisorFactory {
    fn create_worker<'a>(
        &'a self,
        settings: &'a WorkerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let supervisor = self.supervisors.get_or_create(&settings.name);
        let result = if supervisor.is_running() {
            debug!(worker = settings.name, "worker already running");
            Ok(())
        } else {
            supervisor.start(settings.init_message.as_deref(), settings.count_id)
        };
        Box::pin(std::future::ready(result))
    }
}

/// A running leader.
pub struct Leader {
    identity: AgentIdentity,
    config: GlobalConfig,
    hub: Arc<LeaderHub>,
    registry: Arc<ProcessRegistry>,
    supervisors: Arc<SupervisorSet>,
    reconnect: Arc<ReconnectionCoordinator>,
    roster: Arc<Roster>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Leader {
    /// Build the leader context and start its background tasks: status
    /// intake, supervisor event handling, and the reconnection timer.
    ///
    /// Workers are not spawned and no listener is opened yet; see
    /// [`spawn_workers`](Self::spawn_workers) and [`listen`](Self::listen).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if the leader name is invalid.
    pub fn start(
        config: GlobalConfig,
        config_path: Option<PathBuf>,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Arc<Self>> {
        let identity = AgentIdentity::leader(&config.leader)?;
        let (hub, status_rx) = LeaderHub::new(identity.name());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ProcessRegistry::new());

        let supervisors = Arc::new(SupervisorSet {
            leader: identity.name().to_owned(),
            ctx: SupervisorContext {
                launcher,
                registry: Arc::clone(&registry),
                program: config.worker_program.clone(),
                endpoint: config.endpoint.clone(),
                config_path,
                policy: config.supervisor.clone(),
                events: events_tx,
            },
            by_name: Mutex::new(BTreeMap::new()),
        });
        let reconnect = ReconnectionCoordinator::new(
            config.reconnect.clone(),
            Arc::new(SupervisorFactory {
                supervisors: Arc::clone(&supervisors),
            }),
        );
        let roster = Arc::new(Roster::new(config.worker.liveness_timeout()));

        let leader = Arc::new(Self {
            identity,
            config,
            hub,
            registry,
            supervisors,
            reconnect,
            roster,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });

        let status_task = leader.spawn_status_intake(status_rx);
        let events_task = leader.spawn_event_intake(events_rx);
        leader.tasks().extend([status_task, events_task]);
        leader.reconnect.start();
        info!(leader = leader.name(), "leader started");
        Ok(leader)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leader name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// Command hub of this leader.
    #[must_use]
    pub fn hub(&self) -> &Arc<LeaderHub> {
        &self.hub
    }

    /// Registry of live worker processes.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Reconnection coordinator of this leader.
    #[must_use]
    pub fn reconnect(&self) -> &Arc<ReconnectionCoordinator> {
        &self.reconnect
    }

    /// Status roster of this leader.
    #[must_use]
    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    /// Cancelled when the leader shuts down.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Open the local-socket listener workers connect to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the listener cannot be created.
    pub fn listen(&self) -> Result<()> {
        let handle = spawn_hub_server(
            Arc::clone(&self.hub),
            &self.config.endpoint,
            self.cancel.child_token(),
        )?;
        self.tasks().push(handle);
        Ok(())
    }

    fn spawn_status_intake(self: &Arc<Self>, mut rx: mpsc::Receiver<StatusReport>) -> JoinHandle<()> {
        let leader = Arc::clone(self);
        let cancel = self.cancel.clone();
        let span = info_span!("status_intake", leader = self.name());
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        report = rx.recv() => match report {
                            Some(report) => leader.on_status(report),
                            None => break,
                        },
                    }
                }
            }
            .instrument(span),
        )
    }

    fn on_status(&self, report: StatusReport) {
        match report.status {
            StatusKind::Ready => {
                info!(worker = report.worker, message = report.message, "worker ready");
                self.reconnect.clear_worker(&report.worker);
            }
            StatusKind::Error => {
                warn!(
                    worker = report.worker,
                    error = report.error.as_deref().unwrap_or_default(),
                    "worker reported an error"
                );
            }
            StatusKind::Died | StatusKind::Shutdown => {
                info!(worker = report.worker, message = report.message, status = ?report.status, "worker status");
            }
            _ => debug!(worker = report.worker, status = ?report.status, "worker status"),
        }
        self.roster.record(report);
    }

    fn spawn_event_intake(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    ) -> JoinHandle<()> {
        let reconnect = Arc::clone(&self.reconnect);
        let cancel = self.cancel.clone();
        let span = info_span!("supervisor_events", leader = self.name());
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        event = rx.recv() => match event {
                            Some(event) => on_supervisor_event(&reconnect, event),
                            None => break,
                        },
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Start every configured worker; returns the names that launched.
    pub fn spawn_workers(&self) -> Vec<String> {
        let mut started = Vec::new();
        for (count_id, name) in (0_u32..).zip(self.config.workers.iter()) {
            match self.spawn_worker(name, None, count_id) {
                Ok(()) => started.push(name.clone()),
                Err(err) => warn!(worker = name, %err, "failed to spawn worker"),
            }
        }
        started
    }

    /// Start one worker process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` for an invalid name and
    /// `AppError::Process` if the launch fails.
    pub fn spawn_worker(&self, name: &str, init_message: Option<&str>, count_id: u32) -> Result<()> {
        validate_name(name)?;
        if name == self.name() {
            return Err(AppError::Identity(format!(
                "worker '{name}' cannot share the leader's name"
            )));
        }
        self.supervisors
            .get_or_create(name)
            .start(init_message, count_id)
    }

    /// Send one command to one worker; returns its command id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the worker is not connected and
    /// `AppError::Transport` if it cannot take the command.
    pub fn send_worker_command(
        &self,
        worker: &str,
        command: &str,
        args: Map<String, Value>,
    ) -> Result<String> {
        let message = CommandMessage::new(command, args);
        let command_id = message.command_id.clone();
        self.hub.send_to_worker(worker, message)?;
        info!(worker, command, command_id, "command sent");
        Ok(command_id)
    }

    /// Send one command to every connected worker; returns its command id
    /// and how many workers took it.
    pub fn send_group_command(&self, command: &str, args: Map<String, Value>) -> (String, usize) {
        let message = CommandMessage::new(command, args);
        let delivered = self.hub.broadcast(&message);
        info!(command, command_id = message.command_id, delivered, "group command sent");
        (message.command_id, delivered)
    }

    fn supervisor(&self, name: &str) -> Result<Arc<ProcessSupervisor>> {
        self.supervisors
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("no worker named '{name}'")))
    }

    /// Stop a worker with the intentional-stop signal; it is not restarted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown worker and
    /// `AppError::Process` if the signal fails.
    pub fn stop_worker(&self, name: &str) -> Result<()> {
        let supervisor = self.supervisor(name)?;
        self.reconnect.clear_worker(name);
        supervisor.stop()
    }

    /// Ask a connected worker to end its task and exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the worker is not connected.
    pub fn dismiss_worker(&self, name: &str, reason: &str) -> Result<()> {
        self.reconnect.clear_worker(name);
        self.hub.shutdown_worker(name, reason)
    }

    /// Restart a worker process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown worker and
    /// `AppError::Process` if the restart fails.
    pub async fn force_restart_worker(&self, name: &str) -> Result<()> {
        let supervisor = self.supervisor(name)?;
        self.reconnect.clear_worker(name);
        supervisor.force_restart().await
    }

    /// Latest observed state of every worker.
    #[must_use]
    pub fn worker_statuses(&self) -> Vec<WorkerView> {
        self.roster.views()
    }

    /// Workers awaiting reconnection.
    #[must_use]
    pub fn reconnect_status(&self) -> ReconnectStatus {
        self.reconnect.status()
    }

    /// Everything `GET /status` reports.
    #[must_use]
    pub fn status_body(&self) -> StatusBody {
        StatusBody {
            leader: self.name().to_owned(),
            connected: self.hub.connected(),
            workers: self.worker_statuses(),
            reconnect: self.reconnect_status(),
        }
    }

    /// Stop the reconnection timer, signal every worker, wait up to the stop
    /// grace for their processes to exit, and end background tasks.
    pub async fn shutdown(&self) {
        info!(leader = self.name(), "leader shutting down");
        self.reconnect.stop();
        for supervisor in self.supervisors.all() {
            if let Err(err) = supervisor.stop() {
                warn!(worker = supervisor.name(), %err, "failed to stop worker");
            }
        }

        let grace = self.config.supervisor.stop_grace();
        let drained = tokio::time::timeout(grace, async {
            while !self.registry.names().is_empty() {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = ?self.registry.names(), "workers still running at shutdown");
        }

        self.cancel.cancel();
        for task in self.tasks().drain(..) {
            task.abort();
        }
    }
}

fn on_supervisor_event(reconnect: &ReconnectionCoordinator, event: SupervisorEvent) {
    match event {
        SupervisorEvent::Exited {
            worker,
            exit,
            decision,
        } => {
            debug!(worker, %exit, ?decision, "supervisor reported exit");
        }
        SupervisorEvent::CrashLoop { settings } => {
            info!(worker = settings.name, "handing crash-looping worker to reconnection");
            let (name, leader) = (settings.name.clone(), settings.leader.clone());
            reconnect.track_disconnect(&name, &leader, settings);
        }
        SupervisorEvent::RestartFailed { settings, error } => {
            info!(worker = settings.name, error, "handing unrestartable worker to reconnection");
            let (name, leader) = (settings.name.clone(), settings.leader.clone());
            reconnect.track_disconnect(&name, &leader, settings);
        }
    }
}

impl std::fmt::Debug for Leader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leader")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
