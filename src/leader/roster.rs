//! Latest known state of every worker, as seen by the leader.
//!
//! Fed only by status reports, so it may lag or miss transitions. A worker
//! that has not reported for longer than the liveness timeout is flagged
//! stale; nothing acts on the flag besides reporting it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::models::status::{Position, StatusKind, StatusReport};

#[derive(Debug, Clone)]
struct Entry {
    latest: StatusReport,
    last_seen: Instant,
}

/// Observed state of one worker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkerView {
    /// Worker name.
    pub name: String,
    /// Kind of its latest report.
    pub status: StatusKind,
    /// Message of its latest report.
    pub message: String,
    /// Last reported position.
    pub position: Option<Position>,
    /// Last reported health.
    pub health: f64,
    /// Last reported food.
    pub food: f64,
    /// Milliseconds since the latest report.
    pub last_seen_ms: u64,
    /// No report within the liveness timeout.
    pub stale: bool,
}

/// Status roster kept by the leader.
#[derive(Debug)]
pub struct Roster {
    liveness_timeout: Duration,
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl Roster {
    /// Roster flagging workers silent for longer than `liveness_timeout`.
    #[must_use]
    pub fn new(liveness_timeout: Duration) -> Self {
        Self {
            liveness_timeout,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `report` as the worker's latest.
    pub fn record(&self, report: StatusReport) {
        self.entries().insert(
            report.worker.clone(),
            Entry {
                latest: report,
                last_seen: Instant::now(),
            },
        );
    }

    /// Forget `worker`.
    pub fn remove(&self, worker: &str) {
        self.entries().remove(worker);
    }

    /// Latest report of `worker`.
    #[must_use]
    pub fn latest(&self, worker: &str) -> Option<StatusReport> {
        self.entries().get(worker).map(|entry| entry.latest.clone())
    }

    /// Views of every known worker, by name.
    #[must_use]
    pub fn views(&self) -> Vec<WorkerView> {
        let now = Instant::now();
        self.entries()
            .iter()
            .map(|(name, entry)| {
                let silent = now.saturating_duration_since(entry.last_seen);
                WorkerView {
                    name: name.clone(),
                    status: entry.latest.status,
                    message: entry.latest.message.clone(),
                    position: entry.latest.position,
                    health: entry.latest.health,
                    food: entry.latest.food,
                    last_seen_ms: u64::try_from(silent.as_millis()).unwrap_or(u64::MAX),
                    stale: silent > self.liveness_timeout,
                }
            })
            .collect()
    }

    /// Names of workers silent for longer than the liveness timeout.
    #[must_use]
    pub fn stale_workers(&self) -> Vec<String> {
        self.views()
            .into_iter()
            .filter(|view| view.stale)
            .map(|view| view.name)
            .collect()
    }
}
