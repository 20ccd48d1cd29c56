//! Agent identity and name validation.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Role an agent plays in the hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Issues commands and aggregates status.
    Leader,
    /// Executes commands and reports status.
    Worker,
}

/// Immutable identity of an agent process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentIdentity {
    name: String,
    leader: Option<String>,
    role: Role,
}

impl AgentIdentity {
    /// Build a leader identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if the name is malformed.
    pub fn leader(name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_owned(),
            leader: None,
            role: Role::Leader,
        })
    }

    /// Build a worker identity assigned to `leader`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` if either name is malformed.
    pub fn worker(name: &str, leader: &str) -> Result<Self> {
        validate_name(name)?;
        validate_name(leader)?;
        Ok(Self {
            name: name.to_owned(),
            leader: Some(leader.to_owned()),
            role: Role::Worker,
        })
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assigned leader, if any.
    #[must_use]
    pub fn leader_name(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    /// Role in the hierarchy.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)] // Literal pattern; covered by unit tests.
        Regex::new(r"^[A-Za-z0-9_]{3,16}$").expect("valid name pattern")
    })
}

/// Check that `name` is 3–16 characters of letters, digits, or underscore.
///
/// # Errors
///
/// Returns `AppError::Identity` describing the violation.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Identity("name must not be empty".into()));
    }
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(AppError::Identity(format!(
            "'{name}' must be 3-16 characters of letters, digits or underscore"
        )))
    }
}
