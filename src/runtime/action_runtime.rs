//! Per-agent single-flight action runtime.
//!
//! At most one [`Action`] runs at a time. A new request interrupts the
//! running one and takes its place; when several requests overlap only the
//! newest one runs and the others return as interrupted. Resumable actions
//! are remembered and restarted by [`ActionRuntime::try_resume`] once the
//! agent is idle again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::action::{Action, ActionContext, ActionOutcome};
use crate::AppError;

#[derive(Debug)]
struct Running {
    request: u64,
    label: String,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct RuntimeState {
    latest_request: u64,
    in_flight: u32,
    current: Option<Running>,
    resume: Option<Action>,
}

/// Single-flight executor owned by one agent.
#[derive(Debug)]
pub struct ActionRuntime {
    agent: String,
    state: Mutex<RuntimeState>,
    run_lock: tokio::sync::Mutex<()>,
    finished: Notify,
}

impl ActionRuntime {
    /// Runtime for the agent called `agent`.
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            state: Mutex::new(RuntimeState::default()),
            run_lock: tokio::sync::Mutex::new(()),
            finished: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `action`, interrupting whatever is currently running.
    pub async fn run_action(&self, action: Action) -> ActionOutcome {
        let request = {
            let mut state = self.state();
            state.latest_request += 1;
            state.in_flight += 1;
            if let Some(current) = &state.current {
                info!(
                    agent = self.agent,
                    label = action.label(),
                    current = current.label,
                    "action interrupting current action"
                );
                current.cancel.cancel();
            }
            if action.is_resumable() {
                state.resume = Some(action.clone());
            }
            state.latest_request
        };

        let outcome = self.run_exclusive(request, &action).await;

        {
            let mut state = self.state();
            state.in_flight -= 1;
            let ran_to_end = !outcome.interrupted;
            let is_candidate = state
                .resume
                .as_ref()
                .is_some_and(|candidate| candidate.label() == action.label());
            if (ran_to_end || outcome.timedout) && (is_candidate || !outcome.success) {
                // Finished or timed-out resumables and any failure drop the candidate.
                state.resume = None;
            }
        }
        self.finished.notify_waiters();

        outcome
    }

    async fn run_exclusive(&self, request: u64, action: &Action) -> ActionOutcome {
        let _guard = self.run_lock.lock().await;

        let cancel = {
            let mut state = self.state();
            if state.latest_request != request {
                debug!(
                    agent = self.agent,
                    label = action.label(),
                    "action superseded before it started"
                );
                return ActionOutcome::interrupted(Value::Null);
            }
            let cancel = CancellationToken::new();
            state.current = Some(Running {
                request,
                label: action.label().to_owned(),
                cancel: cancel.clone(),
            });
            cancel
        };

        let span = info_span!("action", agent = %self.agent, label = action.label());
        let outcome = execute(action, cancel).instrument(span).await;

        let mut state = self.state();
        if state
            .current
            .as_ref()
            .is_some_and(|running| running.request == request)
        {
            state.current = None;
        }
        outcome
    }

    /// Cancel the running action and wait for it to wind down.
    pub async fn stop(&self) {
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state();
                match &state.current {
                    None => return,
                    Some(running) => running.cancel.cancel(),
                }
            }

            notified.await;
        }
    }

    /// Forget the resume candidate without touching the running action.
    pub fn cancel_resume(&self) {
        if let Some(action) = self.state().resume.take() {
            debug!(agent = self.agent, label = action.label(), "resume cancelled");
        }
    }

    /// Restart the resume candidate in the background if nothing is running.
    ///
    /// Returns `true` when a resumed run was started.
    pub fn try_resume(self: &Arc<Self>) -> bool {
        let candidate = {
            let state = self.state();
            if state.in_flight > 0 {
                return false;
            }
            state.resume.clone()
        };

        let Some(action) = candidate else {
            return false;
        };

        info!(agent = self.agent, label = action.label(), "resuming action");
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = runtime.run_action(action).await;
            if !outcome.success && !outcome.interrupted {
                warn!(agent = runtime.agent, message = %outcome.message, "resumed action failed");
            }
        });
        true
    }

    /// Whether an action is running right now.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.state().current.is_some()
    }

    /// Whether nothing is running or waiting to run.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state().in_flight == 0
    }

    /// Label of the running action.
    #[must_use]
    pub fn current_label(&self) -> Option<String> {
        self.state()
            .current
            .as_ref()
            .map(|running| running.label.clone())
    }

    /// Label of the pending resume candidate.
    #[must_use]
    pub fn resume_label(&self) -> Option<String> {
        self.state()
            .resume
            .as_ref()
            .map(|action| action.label().to_owned())
    }
}

async fn execute(action: &Action, cancel: CancellationToken) -> ActionOutcome {
    let ctx = ActionContext::new(cancel.clone());
    let work = action.start(ctx.clone());
    let deadline = action.timeout();

    let timer = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = work => match result {
            Ok(_) if cancel.is_cancelled() => ActionOutcome::interrupted(ctx.latest()),
            Ok(value) => ActionOutcome::completed(value),
            Err(AppError::Interrupted(_)) => ActionOutcome::interrupted(ctx.latest()),
            Err(err) => {
                warn!(%err, "action failed");
                ActionOutcome::failed(&err)
            }
        },
        () = cancel.cancelled() => {
            debug!("action interrupted");
            ActionOutcome::interrupted(ctx.latest())
        }
        () = timer => {
            cancel.cancel();
            let limit = deadline.unwrap_or(Duration::ZERO);
            info!(?limit, "action timed out");
            ActionOutcome::timed_out(ctx.latest())
        }
    }
}
