//! Rule record and the status values derived from OS command output.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FirewallError, Result};

/// Traffic direction of a rule. Only outbound rules are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
}

impl Direction {
    pub fn as_netsh(self) -> &'static str {
        match self {
            Direction::Out => "out",
        }
    }
}

/// Rule action. Only block rules are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Block,
}

impl Action {
    pub fn as_netsh(self) -> &'static str {
        match self {
            Action::Block => "block",
        }
    }
}

/// The single firewall rule this tool owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub program: String,
    pub direction: Direction,
    pub action: Action,
}

impl RuleSpec {
    /// An outbound block rule for `program`.
    pub fn outbound_block(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            direction: Direction::Out,
            action: Action::Block,
        }
    }

    /// Check that the program path names `expected_file_name`.
    ///
    /// Both `\` and `/` separate path components, so Windows paths are
    /// validated the same way on every host.
    pub fn validate_program(&self, expected_file_name: &str) -> Result<()> {
        let file_name = self
            .program
            .rsplit(|c: char| c == '\\' || c == '/')
            .next()
            .filter(|f| !f.is_empty());

        match file_name {
            Some(f) if f.eq_ignore_ascii_case(expected_file_name) => Ok(()),
            _ => Err(FirewallError::InvalidProgram {
                path: self.program.clone(),
                expected: expected_file_name.to_string(),
            }),
        }
    }
}

/// State of the rule as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Enabled,
    Disabled,
    NotFound,
}

impl RuleStatus {
    pub fn network_state(self) -> NetworkState {
        match self {
            RuleStatus::Enabled => NetworkState::Blocked,
            RuleStatus::Disabled | RuleStatus::NotFound => NetworkState::Allowed,
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStatus::Enabled => write!(f, "enabled"),
            RuleStatus::Disabled => write!(f, "disabled"),
            RuleStatus::NotFound => write!(f, "not found"),
        }
    }
}

/// Network access of the target program, as seen by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    Blocked,
    Allowed,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::Blocked => write!(f, "blocked"),
            NetworkState::Allowed => write!(f, "allowed"),
        }
    }
}
