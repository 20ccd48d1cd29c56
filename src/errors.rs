//! Error types shared across the leader and worker binaries.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Agent name or role failed validation.
    Identity(String),
    /// Connection to the leader or the world was refused or lost.
    Connection(String),
    /// Framing, encoding, or routing failure on the message channel.
    Transport(String),
    /// Worker process could not be spawned or signalled.
    Process(String),
    /// A skill invocation failed.
    Skill(String),
    /// Command name is not part of the registry.
    UnknownCommand(String),
    /// Command arguments did not match the registry schema.
    InvalidArgs(String),
    /// Lifecycle state machine rejected a transition.
    InvalidTransition(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Work was cancelled at a safe point.
    Interrupted(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Identity(msg) => write!(f, "identity: {msg}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Skill(msg) => write!(f, "skill: {msg}"),
            Self::UnknownCommand(name) => write!(f, "unknown command: {name}"),
            Self::InvalidArgs(msg) => write!(f, "invalid args: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Interrupted(msg) => write!(f, "interrupted: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("malformed frame: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
