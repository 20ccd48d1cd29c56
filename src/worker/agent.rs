//! Worker main loop.
//!
//! Wires a world session and a leader link to a [`WorkerCommandExecutor`]
//! and drives it until the worker is told to stop or loses a connection:
//! commands are executed on their own tasks, world events are translated
//! into reports, a heartbeat re-sends the current status when the worker has
//! been quiet, and a fixed tick restarts interrupted resumable actions once
//! the worker is idle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};

use super::executor::WorkerCommandExecutor;
use crate::config::WorkerConfig;
use crate::models::identity::AgentIdentity;
use crate::models::status::StatusKind;
use crate::skills::{WorldConnector, WorldEvent, WorldSession};
use crate::transport::{LeaderFrame, WorkerLink};
use crate::{AppError, Result};

/// Process exit code for a clean stop.
pub const EXIT_OK: i32 = 0;
/// Process exit code for a fatal identity or connection error.
pub const EXIT_FATAL: i32 = 1;
/// Process exit code for a deliberate end of the worker's task.
pub const EXIT_TASK_ENDED: i32 = 2;

/// Timing knobs of the worker loop.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Housekeeping tick period.
    pub tick: Duration,
    /// Heartbeat period.
    pub heartbeat: Duration,
    /// Deadline for world login plus leader handshake.
    pub spawn_timeout: Duration,
    /// Per-command timeout, if any.
    pub command_timeout: Option<Duration>,
    /// Message handed to the worker at launch.
    pub init_message: Option<String>,
}

impl AgentSettings {
    /// Settings from the `[worker]` config section.
    #[must_use]
    pub fn from_config(config: &WorkerConfig, init_message: Option<String>) -> Self {
        Self {
            tick: config.tick(),
            heartbeat: config.heartbeat(),
            spawn_timeout: config.spawn_timeout(),
            command_timeout: config.command_timeout(),
            init_message,
        }
    }
}

/// Why the worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Interrupted by the intentional-stop signal.
    Interrupted,
    /// The leader asked the worker to quit.
    Dismissed {
        /// Reason given by the leader.
        reason: String,
    },
    /// The world or leader connection is gone.
    ConnectionLost {
        /// What closed the connection.
        reason: String,
    },
}

impl ExitReason {
    /// Process exit code for this reason.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => EXIT_OK,
            Self::Dismissed { .. } => EXIT_TASK_ENDED,
            Self::ConnectionLost { .. } => EXIT_FATAL,
        }
    }

    /// Message of the final `shutdown` report.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Interrupted => "Interrupted, shutting down".to_owned(),
            Self::Dismissed { reason } => format!("Dismissed by leader: {reason}"),
            Self::ConnectionLost { reason } => format!("Connection lost: {reason}"),
        }
    }
}

/// Log into the world and connect to the leader within `spawn_timeout`.
///
/// # Errors
///
/// Returns `AppError::Connection` if either connection fails or the
/// deadline passes first.
pub async fn establish<F>(
    identity: &AgentIdentity,
    world: &dyn WorldConnector,
    leader: F,
    spawn_timeout: Duration,
) -> Result<(WorldSession, WorkerLink)>
where
    F: Future<Output = Result<WorkerLink>>,
{
    let connecting = async {
        let session = world.connect(identity).await?;
        let link = leader.await?;
        Ok((session, link))
    };
    tokio::time::timeout(spawn_timeout, connecting)
        .await
        .map_err(|_| {
            AppError::Connection(format!(
                "worker has not spawned after {} seconds",
                spawn_timeout.as_secs()
            ))
        })?
}

/// Run the worker until `shutdown` resolves, the leader dismisses it, or a
/// connection is lost.
pub async fn run_agent<S>(
    identity: AgentIdentity,
    session: WorldSession,
    link: WorkerLink,
    settings: &AgentSettings,
    shutdown: S,
) -> ExitReason
where
    S: Future<Output = ()>,
{
    let span = info_span!("worker", name = identity.name());
    run_inner(identity, session, link, settings, shutdown)
        .instrument(span)
        .await
}

async fn run_inner<S>(
    identity: AgentIdentity,
    session: WorldSession,
    link: WorkerLink,
    settings: &AgentSettings,
    shutdown: S,
) -> ExitReason
where
    S: Future<Output = ()>,
{
    let WorldSession { skills, mut events } = session;
    let WorkerLink {
        mut inbound,
        reporter,
    } = link;
    let executor = Arc::new(WorkerCommandExecutor::new(
        identity,
        skills,
        reporter,
        settings.command_timeout,
    ));

    executor.connected();
    info!("worker spawned");
    executor.report(StatusKind::Ready, "Worker spawned and ready for commands");
    if let Some(init_message) = &settings.init_message {
        info!(init_message, "init message received");
        executor.report(StatusKind::Ready, "Ready!");
    }

    let mut heartbeat = tokio::time::interval(settings.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut tick = tokio::time::interval(settings.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);

    let reason = loop {
        tokio::select! {
            () = &mut shutdown => break ExitReason::Interrupted,
            frame = inbound.recv() => match frame {
                Some(LeaderFrame::Command(message)) => {
                    let executor = Arc::clone(&executor);
                    tokio::spawn(async move { executor.execute_command(&message).await }.in_current_span());
                }
                Some(LeaderFrame::Shutdown { reason }) => break ExitReason::Dismissed { reason },
                None => break ExitReason::ConnectionLost {
                    reason: "leader connection closed".to_owned(),
                },
            },
            event = events.recv() => match event {
                Some(WorldEvent::Damaged { amount }) => executor.on_damage(amount),
                Some(WorldEvent::Died) => {
                    let executor = Arc::clone(&executor);
                    tokio::spawn(async move { executor.on_death().await }.in_current_span());
                }
                Some(WorldEvent::Kicked { reason }) => {
                    break ExitReason::ConnectionLost { reason: format!("kicked: {reason}") };
                }
                Some(WorldEvent::Disconnected { reason }) => {
                    break ExitReason::ConnectionLost { reason };
                }
                Some(WorldEvent::Error { message, fatal: true }) => {
                    break ExitReason::ConnectionLost { reason: message };
                }
                Some(WorldEvent::Error { message, fatal: false }) => {
                    warn!(message, "world connection error");
                }
                None => break ExitReason::ConnectionLost {
                    reason: "world connection closed".to_owned(),
                },
            },
            _ = heartbeat.tick() => executor.heartbeat(settings.heartbeat),
            _ = tick.tick() => {
                if executor.lifecycle().accepts_commands() {
                    executor.runtime().try_resume();
                }
            }
        }
    };

    if matches!(reason, ExitReason::ConnectionLost { .. }) {
        warn!(?reason, "worker lost its connection");
        executor.connection_lost();
    }
    executor.shutdown(&reason.message()).await;
    reason
}
