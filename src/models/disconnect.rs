//! Bookkeeping for workers whose process or connection was lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Everything needed to launch a worker again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Worker name.
    pub name: String,
    /// Assigned leader.
    pub leader: String,
    /// Identifying count passed to the process.
    #[serde(default)]
    pub count_id: u32,
    /// Optional message delivered to the worker on start.
    #[serde(default)]
    pub init_message: Option<String>,
}

impl WorkerSettings {
    /// Settings for a first launch.
    #[must_use]
    pub fn new(name: impl Into<String>, leader: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            leader: leader.into(),
            count_id: 0,
            init_message: None,
        }
    }
}

/// A worker awaiting automatic recreation.
#[derive(Debug, Clone)]
pub struct DisconnectRecord {
    /// Lost worker.
    pub worker_name: String,
    /// Its leader.
    pub leader_name: String,
    /// Snapshot used to recreate it.
    pub settings: WorkerSettings,
    /// Failed attempts so far, starting at 1.
    pub attempts: u32,
    /// Monotonic time of the latest disconnect.
    pub disconnected_at: Instant,
    /// Wall-clock time of the latest disconnect, for reporting.
    pub disconnected_wall: DateTime<Utc>,
}

impl DisconnectRecord {
    /// Whether the reconnect delay has fully elapsed at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant, reconnect_delay: std::time::Duration) -> bool {
        now.saturating_duration_since(self.disconnected_at) >= reconnect_delay
    }

    /// Remaining wait before the next eligible attempt at `now`.
    #[must_use]
    pub fn waiting_for(
        &self,
        now: Instant,
        reconnect_delay: std::time::Duration,
    ) -> std::time::Duration {
        reconnect_delay.saturating_sub(now.saturating_duration_since(self.disconnected_at))
    }
}
