//! Worker lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::models::status::WorkerStatus;
use crate::{AppError, Result};

/// Named lifecycle states of a worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Logging into the world and the leader.
    Connecting,
    /// Idle and accepting commands.
    Ready,
    /// Running a command.
    Executing,
    /// The last command failed; still accepting commands.
    Error,
    /// World or leader connection lost; the process is about to exit.
    Disconnected,
    /// Shut down. Terminal.
    Terminated,
}

/// Inputs that move the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// World login and leader handshake finished.
    Connected,
    /// A command was accepted.
    Dispatch,
    /// The running command finished.
    Succeeded,
    /// The running command failed.
    Failed,
    /// The avatar died.
    Died,
    /// A connection was lost.
    ConnectionLost,
    /// Shutdown was requested.
    Shutdown,
}

impl LifecycleState {
    /// Apply `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` when `event` is not accepted in
    /// the current state.
    pub fn transition(self, event: LifecycleEvent) -> Result<Self> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let next = match (self, event) {
            (S::Connecting, E::Connected) => S::Ready,
            (S::Ready | S::Error, E::Dispatch) => S::Executing,
            (S::Executing, E::Succeeded) => S::Ready,
            (S::Executing, E::Failed) => S::Error,
            (S::Ready | S::Executing | S::Error, E::Died) => S::Ready,
            (S::Connecting | S::Ready | S::Executing | S::Error, E::ConnectionLost) => {
                S::Disconnected
            }
            (S::Terminated, E::Shutdown) => {
                return Err(AppError::InvalidTransition("already terminated".into()))
            }
            (_, E::Shutdown) => S::Terminated,
            (state, event) => {
                return Err(AppError::InvalidTransition(format!(
                    "{event:?} not allowed while {state:?}"
                )))
            }
        };
        Ok(next)
    }

    /// Whether a command may be accepted.
    #[must_use]
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// Status reported for this state.
    #[must_use]
    pub fn status(self) -> WorkerStatus {
        match self {
            Self::Connecting | Self::Ready => WorkerStatus::Idle,
            Self::Executing => WorkerStatus::Executing,
            Self::Error => WorkerStatus::Error,
            Self::Disconnected | Self::Terminated => WorkerStatus::Shutdown,
        }
    }
}
