//! Worker-side command dispatcher.
//!
//! Resolves each [`CommandMessage`] through the static command registry,
//! refuses overlapping commands with a `busy` report, runs skills through
//! the worker's [`ActionRuntime`], and reports the outcome to the leader.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use super::lifecycle::{LifecycleEvent, LifecycleState};
use crate::models::command::{Command, CommandMessage, SkillCall};
use crate::models::identity::AgentIdentity;
use crate::models::status::{StatusKind, StatusReport, WorkerStatus};
use crate::runtime::{Action, ActionRuntime};
use crate::skills::SkillLibrary;
use crate::transport::StatusReporter;
use crate::AppError;

#[derive(Debug)]
struct ExecutorState {
    lifecycle: LifecycleState,
    /// Name of the command holding the executor.
    current: Option<String>,
    /// Bumped on every dispatch and every death so a stale finish cannot
    /// overwrite a newer lifecycle state.
    generation: u64,
    last_report: Option<Instant>,
}

enum Finish {
    Completed(Value),
    Cancelled,
    Failed { error: String, partial: Option<Value> },
}

/// Single-flight command executor of one worker.
pub struct WorkerCommandExecutor {
    identity: AgentIdentity,
    skills: Arc<dyn SkillLibrary>,
    runtime: Arc<ActionRuntime>,
    reporter: StatusReporter,
    command_timeout: Option<Duration>,
    state: Mutex<ExecutorState>,
}

impl WorkerCommandExecutor {
    /// Executor for `identity`, starting in the `connecting` state.
    #[must_use]
    pub fn new(
        identity: AgentIdentity,
        skills: Arc<dyn SkillLibrary>,
        reporter: StatusReporter,
        command_timeout: Option<Duration>,
    ) -> Self {
        let runtime = Arc::new(ActionRuntime::new(identity.name()));
        Self {
            identity,
            skills,
            runtime,
            reporter,
            command_timeout,
            state: Mutex::new(ExecutorState {
                lifecycle: LifecycleState::Connecting,
                current: None,
                generation: 0,
                last_report: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker identity.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// The worker's action runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<ActionRuntime> {
        &self.runtime
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.state().lifecycle
    }

    /// Status derived from the lifecycle state.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.lifecycle().status()
    }

    /// Name of the command currently holding the executor.
    #[must_use]
    pub fn current_command(&self) -> Option<String> {
        self.state().current.clone()
    }

    /// Build and push a report stamped with the avatar's vitals.
    pub fn report(&self, kind: StatusKind, message: impl Into<String>) {
        self.send(self.status_report(kind, message));
    }

    fn send(&self, report: StatusReport) {
        self.state().last_report = Some(Instant::now());
        self.reporter.report(report);
    }

    fn status_report(&self, kind: StatusKind, message: impl Into<String>) -> StatusReport {
        StatusReport::new(
            self.identity.name(),
            self.identity.leader_name().unwrap_or_default(),
            kind,
            message,
            self.skills.vitals(),
        )
    }

    fn apply(&self, event: LifecycleEvent) {
        let mut state = self.state();
        match state.lifecycle.transition(event) {
            Ok(next) => state.lifecycle = next,
            Err(err) => debug!(worker = self.identity.name(), %err, "lifecycle event ignored"),
        }
    }

    /// Login and handshake finished; start accepting commands.
    pub fn connected(&self) {
        self.apply(LifecycleEvent::Connected);
    }

    /// The world or leader connection was lost.
    pub fn connection_lost(&self) {
        self.apply(LifecycleEvent::ConnectionLost);
    }

    /// Re-send the current status unless something was reported within
    /// the last `interval`.
    pub fn heartbeat(&self, interval: Duration) {
        let (status, current) = {
            let state = self.state();
            if state
                .last_report
                .is_some_and(|sent| sent.elapsed() < interval)
            {
                return;
            }
            (state.lifecycle.status(), state.current.clone())
        };
        let message = match current {
            Some(command) => format!("Executing: {command}"),
            None => "Heartbeat".to_owned(),
        };
        self.report(status.heartbeat_kind(), message);
    }

    /// Report damage taken by the avatar.
    pub fn on_damage(&self, amount: f64) {
        self.report(StatusKind::Damaged, format!("Took {amount} damage"));
    }

    /// The avatar died: drop pending resumes, stop the running action, report
    /// `died`, and return to idle.
    pub async fn on_death(&self) {
        {
            let mut state = self.state();
            state.generation += 1;
            state.current = None;
            match state.lifecycle.transition(LifecycleEvent::Died) {
                Ok(next) => state.lifecycle = next,
                Err(err) => {
                    debug!(worker = self.identity.name(), %err, "death ignored");
                    return;
                }
            }
        }
        warn!(worker = self.identity.name(), "worker died");
        self.report(StatusKind::Died, "Died");
        self.runtime.cancel_resume();
        self.runtime.stop().await;
        self.skills.halt();
    }

    /// Stop everything and move to the terminal state.
    pub async fn shutdown(&self, reason: &str) {
        self.runtime.cancel_resume();
        self.runtime.stop().await;
        self.skills.halt();
        {
            let mut state = self.state();
            state.generation += 1;
            state.current = None;
        }
        self.apply(LifecycleEvent::Shutdown);
        info!(worker = self.identity.name(), reason, "worker shutting down");
        self.report(StatusKind::Shutdown, reason);
    }

    /// Execute one command from the leader.
    ///
    /// Never fails: every outcome, including an unknown command, ends up as
    /// a status report.
    pub async fn execute_command(&self, message: &CommandMessage) {
        let span = info_span!(
            "command",
            worker = self.identity.name(),
            command = %message.command,
            command_id = %message.command_id,
        );
        self.execute_inner(message).instrument(span).await;
    }

    async fn execute_inner(&self, message: &CommandMessage) {
        let parsed = Command::parse(&message.command, &message.args);
        let name = message.command.clone();

        if matches!(parsed, Ok(Command::Stop)) {
            self.stop_command(message).await;
            return;
        }

        let generation = {
            let mut state = self.state();
            if state.lifecycle == LifecycleState::Executing {
                let current = state.current.clone().unwrap_or_default();
                drop(state);
                info!(current, "busy, command rejected");
                self.send(
                    self.status_report(StatusKind::Busy, format!("Already executing: {current}"))
                        .with_command_id(&message.command_id),
                );
                return;
            }
            match state.lifecycle.transition(LifecycleEvent::Dispatch) {
                Ok(next) => state.lifecycle = next,
                Err(err) => {
                    drop(state);
                    warn!(%err, "command refused");
                    self.send(
                        self.status_report(StatusKind::Error, format!("Failed: {name}"))
                            .with_command_id(&message.command_id)
                            .with_error(err.to_string()),
                    );
                    return;
                }
            }
            state.current = Some(name.clone());
            state.generation += 1;
            state.generation
        };

        self.send(
            self.status_report(StatusKind::Executing, format!("Started: {name}"))
                .with_command_id(&message.command_id),
        );

        let started = Instant::now();
        let finish = match parsed {
            Ok(Command::Skill(call)) => self.run_skill(call).await,
            Ok(Command::Query(query)) => match self.skills.query(query) {
                Ok(value) => Finish::Completed(value),
                Err(err) => Finish::Failed {
                    error: err.to_string(),
                    partial: None,
                },
            },
            Ok(Command::Stop) => Finish::Completed(json!("Stopped")),
            Ok(Command::Unrecognized(other)) => Finish::Failed {
                error: AppError::UnknownCommand(other).to_string(),
                partial: None,
            },
            Err(err) => Finish::Failed {
                error: err.to_string(),
                partial: None,
            },
        };
        let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let event = match &finish {
            Finish::Completed(_) | Finish::Cancelled => LifecycleEvent::Succeeded,
            Finish::Failed { .. } => LifecycleEvent::Failed,
        };
        {
            let mut state = self.state();
            if state.generation == generation {
                state.current = None;
                if let Ok(next) = state.lifecycle.transition(event) {
                    state.lifecycle = next;
                }
            }
        }

        let report = match finish {
            Finish::Completed(result) => {
                info!(duration, "command completed");
                self.status_report(StatusKind::Completed, format!("Completed: {name}"))
                    .with_result(result)
            }
            Finish::Cancelled => {
                info!(duration, "command cancelled");
                self.status_report(StatusKind::Completed, format!("Cancelled: {name}"))
            }
            Finish::Failed { error, partial } => {
                warn!(duration, error, "command failed");
                let report = self
                    .status_report(StatusKind::Error, format!("Failed: {name}"))
                    .with_error(error);
                match partial {
                    Some(partial) => report.with_result(partial),
                    None => report,
                }
            }
        };
        self.send(report.with_command_id(&message.command_id).with_duration(duration));
    }

    async fn run_skill(&self, call: SkillCall) -> Finish {
        let skills = Arc::clone(&self.skills);
        let label = call.action_label();
        let resumable = call.resumable();
        let action = Action::new(label, move |ctx| {
            let skills = Arc::clone(&skills);
            let call = call.clone();
            async move { skills.invoke(&call, ctx).await }
        })
        .with_timeout(self.command_timeout)
        .resumable(resumable);

        let outcome = self.runtime.run_action(action).await;
        if outcome.success {
            Finish::Completed(outcome.message)
        } else if outcome.timedout {
            Finish::Failed {
                error: "command timed out".to_owned(),
                partial: Some(outcome.message),
            }
        } else if outcome.interrupted {
            Finish::Cancelled
        } else {
            let error = match outcome.message {
                Value::String(text) => text,
                other => other.to_string(),
            };
            Finish::Failed {
                error,
                partial: None,
            }
        }
    }

    async fn stop_command(&self, message: &CommandMessage) {
        let started = Instant::now();
        self.runtime.cancel_resume();
        self.runtime.stop().await;
        self.skills.halt();
        let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!("stop acknowledged");
        self.send(
            self.status_report(StatusKind::Completed, "Completed: stop")
                .with_command_id(&message.command_id)
                .with_result(json!("Stopped"))
                .with_duration(duration),
        );
    }
}

impl std::fmt::Debug for WorkerCommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCommandExecutor")
            .field("identity", &self.identity)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}
