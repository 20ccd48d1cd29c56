//! Worker status values and the worker → leader status report.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted status of a worker's command executor.
///
/// `busy` is deliberately absent: it is a rejection response, never a state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Waiting for a command.
    Idle,
    /// Running a command.
    Executing,
    /// The last command failed; cleared by the next accepted command.
    Error,
    /// The worker's avatar died.
    Died,
    /// The worker is shutting down or has lost its connection.
    Shutdown,
}

impl WorkerStatus {
    /// Report kind used when this status is re-sent on a heartbeat.
    #[must_use]
    pub fn heartbeat_kind(self) -> StatusKind {
        match self {
            Self::Idle => StatusKind::Ready,
            Self::Executing => StatusKind::Executing,
            Self::Error => StatusKind::Error,
            Self::Died => StatusKind::Died,
            Self::Shutdown => StatusKind::Shutdown,
        }
    }
}

/// Kind of a status report on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Worker spawned and accepts commands.
    Ready,
    /// A command started.
    Executing,
    /// A command was rejected because another one is running.
    Busy,
    /// A command finished.
    Completed,
    /// A command failed.
    Error,
    /// The worker took damage.
    Damaged,
    /// The worker died and respawned.
    Died,
    /// The worker is shutting down.
    Shutdown,
}

/// Block-aligned position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    /// X coordinate.
    pub x: i64,
    /// Y coordinate.
    pub y: i64,
    /// Z coordinate.
    pub z: i64,
}

impl Position {
    /// Floor precise world coordinates to block coordinates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // World coordinates fit comfortably in i64.
    pub fn floor(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.floor() as i64,
            y: y.floor() as i64,
            z: z.floor() as i64,
        }
    }
}

/// Snapshot of the worker's avatar attached to every report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vitals {
    /// Position, if spawned.
    pub position: Option<Position>,
    /// Health points.
    pub health: f64,
    /// Food points.
    pub food: f64,
}

/// Status message pushed from a worker to its leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Reporting worker.
    pub worker: String,
    /// Leader the worker is assigned to.
    pub leader: String,
    /// Report kind.
    pub status: StatusKind,
    /// Human-readable message.
    pub message: String,
    /// Position at report time.
    pub position: Option<Position>,
    /// Health at report time.
    pub health: f64,
    /// Food at report time.
    pub food: f64,
    /// Command this report refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// Command result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Command duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl StatusReport {
    /// Build a report stamped with the current time and no command details.
    #[must_use]
    pub fn new(
        worker: impl Into<String>,
        leader: impl Into<String>,
        status: StatusKind,
        message: impl Into<String>,
        vitals: Vitals,
    ) -> Self {
        Self {
            worker: worker.into(),
            leader: leader.into(),
            status,
            message: message.into(),
            position: vitals.position,
            health: vitals.health,
            food: vitals.food,
            command_id: None,
            result: None,
            duration: None,
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Attach the correlation id of the command being reported.
    #[must_use]
    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = Some(command_id.into());
        self
    }

    /// Attach a result value.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Attach a duration in milliseconds.
    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    /// Attach an error description.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
