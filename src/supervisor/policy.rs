//! Restart decision for an exited worker process.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Signal number used for an intentional stop (`SIGINT`).
pub const INTERRUPT_SIGNAL: i32 = 2;

/// How a worker process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exit with `code` and no signal.
    #[must_use]
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by `signal`.
    #[must_use]
    pub fn signalled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Read code and signal from an OS exit status.
    #[must_use]
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }

    /// Whether the intentional-stop signal ended the process.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.signal == Some(INTERRUPT_SIGNAL)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// What the supervisor does about an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitDecision {
    /// Exit code above 1: the worker ended its task on purpose.
    TaskEnded,
    /// Stopped by request or by the intentional-stop signal.
    Intentional,
    /// Exit code 0.
    Clean,
    /// Crashed; start it again.
    Restart,
    /// Crashed again too soon after the previous start.
    CrashLoop,
}

impl ExitDecision {
    /// Whether the supervisor starts the worker again.
    #[must_use]
    pub fn restarts(self) -> bool {
        self == Self::Restart
    }
}

/// Decide what to do about `exit`.
///
/// `since_start` is the time between the previous start and the exit;
/// anything shorter than `crash_loop_floor` is a crash loop.
#[must_use]
pub fn decide(
    exit: ExitInfo,
    stop_requested: bool,
    since_start: Duration,
    crash_loop_floor: Duration,
) -> ExitDecision {
    if exit.code.is_some_and(|code| code > 1) {
        return ExitDecision::TaskEnded;
    }
    if stop_requested || exit.interrupted() {
        return ExitDecision::Intentional;
    }
    if exit.code == Some(0) {
        return ExitDecision::Clean;
    }
    if since_start < crash_loop_floor {
        ExitDecision::CrashLoop
    } else {
        ExitDecision::Restart
    }
}
