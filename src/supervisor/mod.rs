//! Worker process supervision and recovery.
//!
//! - `process`: one [`ProcessSupervisor`] per worker process.
//! - `policy`: the pure exit → restart decision.
//! - `registry`: name → pid table of live workers.
//! - `reconnect`: bounded recreation of lost workers.

pub mod policy;
pub mod process;
pub mod reconnect;
pub mod registry;

pub use policy::{ExitDecision, ExitInfo};
pub use process::{
    Launcher, OsLauncher, ProcessSupervisor, SupervisorContext, SupervisorEvent,
};
pub use reconnect::{ReconnectStatus, ReconnectionCoordinator, WorkerFactory};
pub use registry::ProcessRegistry;
