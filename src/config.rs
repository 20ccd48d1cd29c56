//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::identity::validate_name;
use crate::{AppError, Result};

/// Restart policy thresholds applied by each process supervisor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Minimum uptime before a crashed worker is restarted automatically.
    #[serde(default = "default_crash_loop_floor")]
    pub crash_loop_floor_seconds: u64,
    /// Grace window between the stop signal and a forced restart.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

impl SupervisorConfig {
    /// Crash-loop floor as a [`Duration`].
    #[must_use]
    pub fn crash_loop_floor(&self) -> Duration {
        Duration::from_secs(self.crash_loop_floor_seconds)
    }

    /// Stop grace window as a [`Duration`].
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            crash_loop_floor_seconds: default_crash_loop_floor(),
            stop_grace_seconds: default_stop_grace(),
        }
    }
}

/// Reconnection coordinator thresholds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReconnectConfig {
    /// Tracked failures tolerated before a worker is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum wait between a disconnect and the next recreation attempt.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,
    /// Period of the background reconnection sweep.
    #[serde(default = "default_reconnect_delay")]
    pub check_interval_seconds: u64,
}

impl ReconnectConfig {
    /// Reconnect delay as a [`Duration`].
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    /// Sweep period as a [`Duration`].
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            reconnect_delay_seconds: default_reconnect_delay(),
            check_interval_seconds: default_reconnect_delay(),
        }
    }
}

/// Worker-side timing knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Period of the housekeeping update tick.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Heartbeat period for periodic status reports.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    /// Time allowed for the worker to become ready after launch.
    #[serde(default = "default_spawn_timeout")]
    pub spawn_timeout_seconds: u64,
    /// Silence after which the leader flags a worker as stale.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_seconds: u64,
    /// Optional per-command timeout; absent means no timeout.
    #[serde(default)]
    pub command_timeout_seconds: Option<u64>,
}

impl WorkerConfig {
    /// Update tick period.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Heartbeat period.
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    /// Spawn timeout.
    #[must_use]
    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_secs(self.spawn_timeout_seconds)
    }

    /// Liveness timeout used by the leader roster.
    #[must_use]
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_seconds)
    }

    /// Per-command timeout, if configured.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            heartbeat_seconds: default_heartbeat_seconds(),
            spawn_timeout_seconds: default_spawn_timeout(),
            liveness_timeout_seconds: default_liveness_timeout(),
            command_timeout_seconds: None,
        }
    }
}

fn default_crash_loop_floor() -> u64 {
    5
}

fn default_stop_grace() -> u64 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_reconnect_delay() -> u64 {
    15
}

fn default_tick_millis() -> u64 {
    300
}

fn default_heartbeat_seconds() -> u64 {
    5
}

fn default_spawn_timeout() -> u64 {
    30
}

fn default_liveness_timeout() -> u64 {
    15
}

fn default_endpoint() -> String {
    "squadron".into()
}

fn default_worker_program() -> PathBuf {
    PathBuf::from("squadron-worker")
}

fn default_http_port() -> u16 {
    3100
}

/// Global configuration parsed from `squadron.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Name of the leader that workers report to.
    pub leader: String,
    /// Local socket name the leader listens on.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Path to the worker binary launched by the supervisors.
    #[serde(default = "default_worker_program")]
    pub worker_program: PathBuf,
    /// Worker names to spawn at startup.
    #[serde(default)]
    pub workers: Vec<String>,
    /// HTTP port for the status endpoint; 0 disables it.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Restart policy thresholds.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Reconnection thresholds.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Worker-side timing knobs.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_name(&self.leader)
            .map_err(|err| AppError::Config(format!("leader name invalid: {err}")))?;

        for (idx, name) in self.workers.iter().enumerate() {
            validate_name(name)
                .map_err(|err| AppError::Config(format!("worker name invalid: {err}")))?;
            if self.workers[..idx].contains(name) || *name == self.leader {
                return Err(AppError::Config(format!("duplicate agent name: {name}")));
            }
        }

        if self.endpoint.trim().is_empty() {
            return Err(AppError::Config("endpoint must not be empty".into()));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(AppError::Config(
                "reconnect.max_attempts must be greater than zero".into(),
            ));
        }

        if self.reconnect.check_interval_seconds == 0 {
            return Err(AppError::Config(
                "reconnect.check_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.worker.tick_millis == 0 || self.worker.heartbeat_seconds == 0 {
            return Err(AppError::Config(
                "worker tick and heartbeat periods must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
