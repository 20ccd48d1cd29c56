//! Seam to the external skill library and game world.
//!
//! The core only ever asks a [`SkillLibrary`] to run a [`SkillCall`] and
//! awaits the outcome. World-side happenings (damage, death, being kicked)
//! arrive as [`WorldEvent`]s on the channel handed out by a
//! [`WorldConnector`].

pub mod dry_run;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::models::command::{Query, SkillCall};
use crate::models::identity::AgentIdentity;
use crate::models::status::Vitals;
use crate::runtime::ActionContext;
use crate::Result;

/// Events raised by the world a worker is connected to.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// The avatar lost health.
    Damaged {
        /// Health points lost.
        amount: f64,
    },
    /// The avatar died and respawned.
    Died,
    /// The server removed the worker.
    Kicked {
        /// Reason given by the server.
        reason: String,
    },
    /// The connection closed.
    Disconnected {
        /// Reason for the close.
        reason: String,
    },
    /// A connection-level error.
    Error {
        /// Error description.
        message: String,
        /// Whether the error ends the connection (duplicate login, refused).
        fatal: bool,
    },
}

/// Opaque callable-by-name skill interface.
pub trait SkillLibrary: Send + Sync {
    /// Run a skill, polling `ctx` at safe points.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Skill` when the skill fails and
    /// `AppError::Interrupted` when it stopped at a safe point.
    fn invoke(
        &self,
        call: &SkillCall,
        ctx: ActionContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;

    /// Answer an introspection query from current state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Skill` if the state is not available yet.
    fn query(&self, query: Query) -> Result<Value>;

    /// Current avatar snapshot for status reports.
    fn vitals(&self) -> Vitals;

    /// Halt movement and digging immediately.
    fn halt(&self);
}

/// A live world connection.
pub struct WorldSession {
    /// Skills bound to the connected avatar.
    pub skills: Arc<dyn SkillLibrary>,
    /// World events for the avatar.
    pub events: mpsc::Receiver<WorldEvent>,
}

/// Opens world connections for a worker identity.
pub trait WorldConnector: Send + Sync {
    /// Connect `identity` to the world.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connection` if the world refuses the login.
    fn connect(
        &self,
        identity: &AgentIdentity,
    ) -> Pin<Box<dyn Future<Output = Result<WorldSession>> + Send + '_>>;
}
