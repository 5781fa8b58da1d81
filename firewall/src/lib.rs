//! Outbound firewall rule management for a single program.
//!
//! Uses `netsh advfirewall` to create, enable and disable one block rule,
//! and either `netsh` or PowerShell's `Get-NetFirewallRule` to read its
//! state back. All process execution goes through [`CommandRunner`].

pub mod error;
pub mod manager;
pub mod netsh;
pub mod powershell;
pub mod rule;
pub mod runner;

pub use error::{FirewallError, Result};
pub use manager::{EnsureOutcome, ProbeBackend, RuleManager, ToggleOutcome};
pub use rule::{Action, Direction, NetworkState, RuleSpec, RuleStatus};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
