//! Best-effort message channel between the leader and its workers.
//!
//! Nothing here acknowledges or retries: a command that cannot be delivered
//! is dropped with a log line, and status reports are pushed with
//! `try_send` so a slow leader never stalls a worker.
//!
//! - `codec`: NDJSON framing shared by both directions.
//! - `hub`: leader-side routing table ([`LeaderHub`]).
//! - `memory`: in-process links for tests and embedded use.
//! - `server` / `client`: the same frames over a local socket.

pub mod client;
pub mod codec;
pub mod hub;
pub mod memory;
pub mod server;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::command::CommandMessage;
use crate::models::status::StatusReport;

pub use hub::LeaderHub;

/// Frames sent from the leader to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeaderFrame {
    /// Execute a command.
    Command(CommandMessage),
    /// Shut down cleanly.
    Shutdown {
        /// Why the leader is stopping the worker.
        reason: String,
    },
}

/// Frames sent from a worker to the leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerFrame {
    /// First frame on every connection.
    Hello {
        /// Worker name.
        worker: String,
        /// Leader the worker expects to serve.
        leader: String,
        /// Identifying count of this process.
        #[serde(default)]
        count_id: u32,
    },
    /// A status report.
    Status(StatusReport),
}

/// Cheap, clonable handle for pushing status reports.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::Sender<StatusReport>,
}

impl StatusReporter {
    /// Reporter feeding `tx`.
    #[must_use]
    pub fn new(tx: mpsc::Sender<StatusReport>) -> Self {
        Self { tx }
    }

    /// Push a report; drops it when the channel is full or closed.
    pub fn report(&self, report: StatusReport) {
        match self.tx.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                warn!(
                    worker = report.worker,
                    status = ?report.status,
                    "status channel full, report dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(report)) => {
                debug!(worker = report.worker, "status channel closed, report dropped");
            }
        }
    }
}

/// Worker end of a leader connection.
#[derive(Debug)]
pub struct WorkerLink {
    /// Frames from the leader; closes when the connection is lost.
    pub inbound: mpsc::Receiver<LeaderFrame>,
    /// Outbound status reports.
    pub reporter: StatusReporter,
}
