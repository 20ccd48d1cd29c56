//! Bounded recreation of lost workers.
//!
//! A lost worker is tracked with a [`DisconnectRecord`]. Once its record
//! is older than the reconnect delay the coordinator removes it and asks
//! the [`WorkerFactory`] to recreate the worker; a failed attempt puts the
//! worker back with one more attempt counted. A recreated worker keeps its
//! attempt count until [`ReconnectionCoordinator::clear_worker`] confirms
//! it is healthy, so a worker that is lost again right after recreation
//! continues counting. Past `max_attempts` the worker is dropped and only a
//! warning remains.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ReconnectConfig;
use crate::models::disconnect::{DisconnectRecord, WorkerSettings};
use crate::Result;

/// Recreates a worker from its settings snapshot.
pub trait WorkerFactory: Send + Sync {
    /// Start the worker again.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker could not be started.
    fn create_worker<'a>(
        &'a self,
        settings: &'a WorkerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// One tracked worker in a [`ReconnectStatus`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingWorker {
    /// Worker name.
    pub name: String,
    /// Its leader.
    pub leader: String,
    /// Attempts counted so far.
    pub attempts: u32,
    /// Remaining wait before the next attempt.
    pub waiting_for: Duration,
    /// When the worker was last lost.
    pub disconnected_at: DateTime<Utc>,
}

/// Snapshot of the coordinator for observability.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconnectStatus {
    /// Number of tracked workers.
    pub pending: usize,
    /// Tracked workers, by name.
    pub workers: Vec<PendingWorker>,
}

struct Timer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Tracks lost workers and recreates them on a timer.
pub struct ReconnectionCoordinator {
    config: ReconnectConfig,
    factory: Arc<dyn WorkerFactory>,
    records: Mutex<HashMap<String, DisconnectRecord>>,
    // Attempts of recreated workers not yet confirmed healthy.
    recreated: Mutex<HashMap<String, u32>>,
    timer: Mutex<Option<Timer>>,
}

impl ReconnectionCoordinator {
    /// Coordinator recreating workers through `factory`.
    #[must_use]
    pub fn new(config: ReconnectConfig, factory: Arc<dyn WorkerFactory>) -> Arc<Self> {
        Arc::new(Self {
            config,
            factory,
            records: Mutex::new(HashMap::new()),
            recreated: Mutex::new(HashMap::new()),
            timer: Mutex::new(None),
        })
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, DisconnectRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recreated(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.recreated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Option<Timer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a lost worker, counting one more attempt.
    ///
    /// Attempts accumulate across recreations until the worker is cleared.
    /// Returns `false` when the worker exceeded `max_attempts` and was
    /// dropped from tracking.
    pub fn track_disconnect(&self, worker: &str, leader: &str, settings: WorkerSettings) -> bool {
        let previous = self.recreated().remove(worker);
        let mut records = self.records();
        let attempts = records
            .get(worker)
            .map(|record| record.attempts)
            .or(previous)
            .unwrap_or(0)
            + 1;

        if attempts > self.config.max_attempts {
            records.remove(worker);
            warn!(
                worker,
                leader,
                attempts,
                max_attempts = self.config.max_attempts,
                "worker exceeded reconnect attempts, giving up"
            );
            return false;
        }

        info!(worker, leader, attempts, "tracking disconnected worker");
        records.insert(
            worker.to_owned(),
            DisconnectRecord {
                worker_name: worker.to_owned(),
                leader_name: leader.to_owned(),
                settings,
                attempts,
                disconnected_at: Instant::now(),
                disconnected_wall: Utc::now(),
            },
        );
        true
    }

    /// Recreate every worker whose reconnect delay has elapsed.
    ///
    /// Returns the names of the workers recreated successfully.
    pub async fn process_reconnects(&self) -> Vec<String> {
        let now = Instant::now();
        let delay = self.config.reconnect_delay();
        let due: Vec<DisconnectRecord> = {
            let mut records = self.records();
            let names: Vec<String> = records
                .values()
                .filter(|record| record.is_due(now, delay))
                .map(|record| record.worker_name.clone())
                .collect();
            names
                .iter()
                .filter_map(|name| records.remove(name))
                .collect()
        };

        let mut restored = Vec::new();
        for record in due {
            info!(
                worker = record.worker_name,
                attempt = record.attempts,
                "attempting to recreate worker"
            );
            // Recorded before the launch, which may already report a loss.
            self.recreated()
                .insert(record.worker_name.clone(), record.attempts);
            match self.factory.create_worker(&record.settings).await {
                Ok(()) => {
                    info!(worker = record.worker_name, "worker recreated");
                    restored.push(record.worker_name);
                }
                Err(err) => {
                    warn!(worker = record.worker_name, %err, "failed to recreate worker");
                    self.recreated().remove(&record.worker_name);
                    self.retrack(record);
                }
            }
        }
        restored
    }

    fn retrack(&self, record: DisconnectRecord) {
        let mut records = self.records();
        let attempts = record.attempts + 1;
        if attempts > self.config.max_attempts {
            records.remove(&record.worker_name);
            warn!(
                worker = record.worker_name,
                attempts,
                "worker exceeded reconnect attempts, giving up"
            );
            return;
        }
        records.insert(
            record.worker_name.clone(),
            DisconnectRecord {
                attempts,
                disconnected_at: Instant::now(),
                disconnected_wall: Utc::now(),
                ..record
            },
        );
    }

    /// Stop tracking `worker` and forget its attempt count; returns whether
    /// it was pending or awaiting confirmation.
    pub fn clear_worker(&self, worker: &str) -> bool {
        let pending = self.records().remove(worker).is_some();
        let recreated = self.recreated().remove(worker).is_some();
        let removed = pending || recreated;
        if removed {
            debug!(worker, "worker cleared from reconnection");
        }
        removed
    }

    /// Whether `worker` is tracked.
    #[must_use]
    pub fn is_tracked(&self, worker: &str) -> bool {
        self.records().contains_key(worker)
    }

    /// Attempts counted for `worker`.
    #[must_use]
    pub fn attempts(&self, worker: &str) -> Option<u32> {
        self.records().get(worker).map(|record| record.attempts)
    }

    /// Pending workers and their remaining wait.
    #[must_use]
    pub fn status(&self) -> ReconnectStatus {
        let now = Instant::now();
        let delay = self.config.reconnect_delay();
        let records = self.records();
        let mut workers: Vec<PendingWorker> = records
            .values()
            .map(|record| PendingWorker {
                name: record.worker_name.clone(),
                leader: record.leader_name.clone(),
                attempts: record.attempts,
                waiting_for: record.waiting_for(now, delay),
                disconnected_at: record.disconnected_wall,
            })
            .collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        ReconnectStatus {
            pending: workers.len(),
            workers,
        }
    }

    /// Start the check timer; a second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut timer = self.timer();
        if timer.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let this = Arc::clone(self);
        let period = self.config.check_interval();
        let span = info_span!("reconnect_timer", period = ?period);
        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = token.cancelled() => {
                            debug!("reconnect timer stopped");
                            break;
                        }
                        _ = ticker.tick() => {
                            this.process_reconnects().await;
                        }
                    }
                }
            }
            .instrument(span),
        );
        *timer = Some(Timer { cancel, handle });
        info!("reconnection coordinator started");
    }

    /// Stop the check timer; a no-op when not running.
    pub fn stop(&self) {
        if let Some(timer) = self.timer().take() {
            timer.cancel.cancel();
            timer.handle.abort();
            info!("reconnection coordinator stopped");
        }
    }

    /// Whether the check timer runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer().is_some()
    }
}

impl std::fmt::Debug for ReconnectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectionCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
