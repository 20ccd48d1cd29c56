//! Actions, their execution context, and run outcomes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{AppError, Result};

/// Boxed future produced by an action's unit of work.
pub type WorkFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

type WorkFn = Arc<dyn Fn(ActionContext) -> WorkFuture + Send + Sync>;

/// A labeled unit of work with an optional timeout and resume flag.
///
/// The label is bound when the action is built and never changes, so every
/// run of the same action reports under the same name.
#[derive(Clone)]
pub struct Action {
    label: String,
    work: WorkFn,
    timeout: Option<Duration>,
    resume: bool,
}

impl Action {
    /// Build an action with no timeout that is discarded on interruption.
    pub fn new<F, Fut>(label: impl Into<String>, work: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            label: label.into(),
            work: Arc::new(move |ctx| Box::pin(work(ctx))),
            timeout: None,
            resume: false,
        }
    }

    /// Abort the run after `timeout`; `None` or a zero duration disables it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|d| !d.is_zero());
        self
    }

    /// Mark whether the action is restarted automatically after an interruption.
    #[must_use]
    pub fn resumable(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Label bound at construction.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the action is a resume candidate.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.resume
    }

    pub(crate) fn start(&self, ctx: ActionContext) -> WorkFuture {
        (self.work)(ctx)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .field("resume", &self.resume)
            .finish_non_exhaustive()
    }
}

/// Handle passed into every unit of work.
///
/// Carries the run's cancellation token and a slot for the latest progress
/// message, which is what a timed-out or interrupted run reports.
#[derive(Debug, Clone)]
pub struct ActionContext {
    cancel: CancellationToken,
    progress: Arc<Mutex<Value>>,
}

impl ActionContext {
    /// Context bound to `cancel`.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: Arc::new(Mutex::new(Value::Null)),
        }
    }

    /// Context that is never cancelled, for work run outside a runtime.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Cancellation token of this run.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the run has been asked to stop.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Safe point: bail out if the run has been asked to stop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Interrupted` once the token is cancelled.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(AppError::Interrupted("action stopped".into()))
        } else {
            Ok(())
        }
    }

    /// Resolve when the run is asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Record the latest progress message.
    pub fn report(&self, message: impl Into<Value>) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = message.into();
    }

    /// Latest progress message recorded by the work.
    #[must_use]
    pub fn latest(&self) -> Value {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Result of [`ActionRuntime::run_action`](super::ActionRuntime::run_action).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// The work ran to completion without error.
    pub success: bool,
    /// The run was stopped before completing.
    pub interrupted: bool,
    /// The run was stopped by its timeout.
    pub timedout: bool,
    /// Returned value, error text, or latest progress message.
    pub message: Value,
}

impl ActionOutcome {
    pub(crate) fn completed(message: Value) -> Self {
        Self {
            success: true,
            interrupted: false,
            timedout: false,
            message,
        }
    }

    pub(crate) fn failed(err: &AppError) -> Self {
        Self {
            success: false,
            interrupted: false,
            timedout: false,
            message: Value::String(err.to_string()),
        }
    }

    pub(crate) fn interrupted(message: Value) -> Self {
        Self {
            success: false,
            interrupted: true,
            timedout: false,
            message,
        }
    }

    pub(crate) fn timed_out(message: Value) -> Self {
        Self {
            success: false,
            interrupted: true,
            timedout: true,
            message,
        }
    }

    /// Stopped by another action or by `stop()`; the caller surfaces nothing.
    #[must_use]
    pub fn is_silent_cancel(&self) -> bool {
        self.interrupted && !self.timedout
    }
}
