//! Leader-side routing table.
//!
//! Every connected worker owns an outbound queue in the hub. Commands are
//! pushed with `try_send`; a worker whose queue is full or gone simply does
//! not receive the command.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{LeaderFrame, StatusReporter};
use crate::models::command::CommandMessage;
use crate::models::status::StatusReport;
use crate::{AppError, Result};

/// Depth of each worker's outbound command queue.
pub const WORKER_QUEUE_DEPTH: usize = 32;

/// Depth of the shared inbound status queue.
pub const STATUS_QUEUE_DEPTH: usize = 1024;

#[derive(Debug)]
struct Route {
    connection: u64,
    tx: mpsc::Sender<LeaderFrame>,
}

#[derive(Debug, Default)]
struct Routes {
    next_connection: u64,
    by_worker: HashMap<String, Route>,
}

/// Routes commands to connected workers and collects their status reports.
#[derive(Debug)]
pub struct LeaderHub {
    leader: String,
    routes: Mutex<Routes>,
    status_tx: mpsc::Sender<StatusReport>,
}

/// Registration returned by [`LeaderHub::attach`].
#[derive(Debug)]
pub struct Attachment {
    /// Connection identifier, used to detach only this registration.
    pub connection: u64,
    /// Frames addressed to the worker.
    pub rx: mpsc::Receiver<LeaderFrame>,
}

impl LeaderHub {
    /// Hub for `leader`, plus the receiver of every worker status report.
    #[must_use]
    pub fn new(leader: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<StatusReport>) {
        let (status_tx, status_rx) = mpsc::channel(STATUS_QUEUE_DEPTH);
        let hub = Arc::new(Self {
            leader: leader.into(),
            routes: Mutex::new(Routes::default()),
            status_tx,
        });
        (hub, status_rx)
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leader this hub serves.
    #[must_use]
    pub fn leader(&self) -> &str {
        &self.leader
    }

    /// Register `worker`; a newer connection replaces an older one.
    pub fn attach(&self, worker: &str) -> Attachment {
        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
        let mut routes = self.routes();
        routes.next_connection += 1;
        let connection = routes.next_connection;
        if routes
            .by_worker
            .insert(worker.to_owned(), Route { connection, tx })
            .is_some()
        {
            warn!(worker, "worker reconnected, replacing previous connection");
        } else {
            info!(worker, "worker attached");
        }
        Attachment { connection, rx }
    }

    /// Remove the registration made by `connection`, if still current.
    pub fn detach(&self, worker: &str, connection: u64) {
        let mut routes = self.routes();
        if routes
            .by_worker
            .get(worker)
            .is_some_and(|route| route.connection == connection)
        {
            routes.by_worker.remove(worker);
            info!(worker, "worker detached");
        }
    }

    /// Deliver a command to one worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the worker is not connected and
    /// `AppError::Transport` if its queue is full or closed.
    pub fn send_to_worker(&self, worker: &str, message: CommandMessage) -> Result<()> {
        self.send_frame(worker, LeaderFrame::Command(message))
    }

    /// Ask one worker to shut down.
    ///
    /// # Errors
    ///
    /// Same as [`send_to_worker`](Self::send_to_worker).
    pub fn shutdown_worker(&self, worker: &str, reason: &str) -> Result<()> {
        self.send_frame(
            worker,
            LeaderFrame::Shutdown {
                reason: reason.to_owned(),
            },
        )
    }

    fn send_frame(&self, worker: &str, frame: LeaderFrame) -> Result<()> {
        let routes = self.routes();
        let route = routes
            .by_worker
            .get(worker)
            .ok_or_else(|| AppError::NotFound(format!("worker {worker} is not connected")))?;
        route
            .tx
            .try_send(frame)
            .map_err(|err| AppError::Transport(format!("cannot reach {worker}: {err}")))
    }

    /// Deliver a command to every connected worker; returns how many took it.
    pub fn broadcast(&self, message: &CommandMessage) -> usize {
        let routes = self.routes();
        let mut delivered = 0;
        for (worker, route) in &routes.by_worker {
            match route.tx.try_send(LeaderFrame::Command(message.clone())) {
                Ok(()) => delivered += 1,
                Err(err) => debug!(worker, %err, "broadcast skipped worker"),
            }
        }
        delivered
    }

    /// Names of the workers currently connected.
    #[must_use]
    pub fn connected(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes().by_worker.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `worker` is connected.
    #[must_use]
    pub fn is_connected(&self, worker: &str) -> bool {
        self.routes().by_worker.contains_key(worker)
    }

    /// Handle for pushing status reports into the leader's queue.
    #[must_use]
    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(self.status_tx.clone())
    }
}
