//! Single-flight action execution.
//!
//! - `action`: [`Action`] (label bound at construction, timeout, resume flag),
//!   the [`ActionContext`] threaded into every unit of work, and
//!   [`ActionOutcome`].
//! - `action_runtime`: the per-agent [`ActionRuntime`].

pub mod action;
pub mod action_runtime;

pub use action::{Action, ActionContext, ActionOutcome, WorkFuture};
pub use action_runtime::ActionRuntime;
