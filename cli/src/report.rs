//! User-facing output: one line of text, or a JSON object with `--json`.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use familyshare_firewall::{EnsureOutcome, NetworkState, RuleSpec, RuleStatus, ToggleOutcome};
use serde::Serialize;

use crate::watch::StatusChange;

#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub rule: &'a str,
    pub program: &'a str,
    pub status: RuleStatus,
    pub network: NetworkState,
    pub checked_at: String,
}

impl<'a> StatusReport<'a> {
    pub fn new(rule: &'a RuleSpec, status: RuleStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            rule: &rule.name,
            program: &rule.program,
            status,
            network: status.network_state(),
            checked_at: checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn text(&self) -> String {
        format!(
            "{}: rule {}, network {}",
            self.rule, self.status, self.network
        )
    }
}

#[derive(Debug, Serialize)]
pub struct EnsureReport<'a> {
    pub rule: &'a str,
    pub program: &'a str,
    pub outcome: EnsureOutcome,
    pub status: RuleStatus,
    pub network: NetworkState,
    pub checked_at: String,
}

impl<'a> EnsureReport<'a> {
    pub fn new(
        rule: &'a RuleSpec,
        outcome: EnsureOutcome,
        status: RuleStatus,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            rule: &rule.name,
            program: &rule.program,
            outcome,
            status,
            network: status.network_state(),
            checked_at: checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn text(&self) -> String {
        match self.outcome {
            EnsureOutcome::Created => format!(
                "{}: firewall rule created for {} (disabled, network allowed)",
                self.rule, self.program
            ),
            EnsureOutcome::AlreadyPresent => format!(
                "{}: firewall rule already exists, rule {}, network {}",
                self.rule, self.status, self.network
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Changed,
    Unchanged,
}

/// Result of `block`, `allow` or `toggle`. `from` is only present when the
/// rule actually changed; `status` is always the state afterwards.
#[derive(Debug, Serialize)]
pub struct ToggleReport<'a> {
    pub rule: &'a str,
    pub outcome: Change,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<RuleStatus>,
    pub status: RuleStatus,
    pub network: NetworkState,
    pub checked_at: String,
}

impl<'a> ToggleReport<'a> {
    pub fn new(rule: &'a RuleSpec, outcome: ToggleOutcome, checked_at: DateTime<Utc>) -> Self {
        let (change, from) = match outcome {
            ToggleOutcome::Changed { from, .. } => (Change::Changed, Some(from)),
            ToggleOutcome::Unchanged { .. } => (Change::Unchanged, None),
        };
        let status = outcome.status();
        Self {
            rule: &rule.name,
            outcome: change,
            from,
            status,
            network: status.network_state(),
            checked_at: checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn text(&self) -> String {
        match self.outcome {
            Change::Changed => format!(
                "{}: rule {}, network {}",
                self.rule, self.status, self.network
            ),
            Change::Unchanged => format!(
                "{}: rule already {}, network {}",
                self.rule, self.status, self.network
            ),
        }
    }
}

pub fn change_report<'a>(rule: &'a RuleSpec, change: &StatusChange) -> StatusReport<'a> {
    StatusReport::new(rule, change.status, change.checked_at)
}

/// Print `value` as a single JSON line or as its text form.
pub fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        let rendered = serde_json::to_string(value).context("Failed to serialize output")?;
        println!("{rendered}");
    } else {
        println!("{}", text());
    }
    Ok(())
}
