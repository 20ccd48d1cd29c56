#![forbid(unsafe_code)]

//! Leader/worker command-and-control core.
//!
//! A leader supervises worker processes, routes commands to them, and
//! collects their status; each worker runs commands one at a time through a
//! single-flight action runtime.

pub mod cli;
pub mod config;
pub mod errors;
pub mod leader;
pub mod models;
pub mod runtime;
pub mod skills;
pub mod supervisor;
pub mod transport;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
