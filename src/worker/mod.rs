//! Worker process internals: lifecycle, command execution, main loop.

pub mod agent;
pub mod executor;
pub mod lifecycle;

pub use executor::WorkerCommandExecutor;
