//! Rule status probing and toggling.
//!
//! The manager owns one [`RuleSpec`] and drives `netsh` (or PowerShell for
//! probes) through a [`CommandRunner`]:
//!   - `status` maps command output to enabled / disabled / not found
//!   - `ensure` creates the rule, disabled, when it is missing
//!   - `block` / `allow` / `toggle` flip the rule only when needed

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::Result;
use crate::netsh;
use crate::powershell;
use crate::rule::{RuleSpec, RuleStatus};
use crate::runner::CommandRunner;

/// Which OS command answers status probes. Mutations always use netsh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    #[default]
    Netsh,
    #[serde(alias = "pwsh")]
    PowerShell,
}

impl fmt::Display for ProbeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeBackend::Netsh => write!(f, "netsh"),
            ProbeBackend::PowerShell => write!(f, "powershell"),
        }
    }
}

impl FromStr for ProbeBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netsh" => Ok(ProbeBackend::Netsh),
            "powershell" | "pwsh" => Ok(ProbeBackend::PowerShell),
            other => Err(format!(
                "unknown probe backend `{other}` (expected `netsh` or `powershell`)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ToggleOutcome {
    Changed { from: RuleStatus, to: RuleStatus },
    Unchanged { status: RuleStatus },
}

impl ToggleOutcome {
    /// Rule status after the operation.
    pub fn status(self) -> RuleStatus {
        match self {
            ToggleOutcome::Changed { to, .. } => to,
            ToggleOutcome::Unchanged { status } => status,
        }
    }
}

pub struct RuleManager<R> {
    runner: R,
    rule: RuleSpec,
    backend: ProbeBackend,
}

impl<R: CommandRunner> RuleManager<R> {
    pub fn new(runner: R, rule: RuleSpec, backend: ProbeBackend) -> Self {
        Self {
            runner,
            rule,
            backend,
        }
    }

    pub fn rule(&self) -> &RuleSpec {
        &self.rule
    }

    pub fn backend(&self) -> ProbeBackend {
        self.backend
    }

    /// Query the OS for the rule's current state.
    pub fn status(&self) -> Result<RuleStatus> {
        let status = match self.backend {
            ProbeBackend::Netsh => {
                let args = netsh::show_args(&self.rule.name);
                let output = self.runner.run(netsh::NETSH, &args)?;
                netsh::show_status(&output, &args, &self.rule.name)?
            }
            ProbeBackend::PowerShell => {
                let args = powershell::probe_args(&self.rule.name);
                let output = self.runner.run(powershell::POWERSHELL, &args)?;
                powershell::query_status(&output, &args)?
            }
        };
        debug!(rule = %self.rule.name, backend = %self.backend, %status, "probed rule");
        Ok(status)
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.status()? != RuleStatus::NotFound)
    }

    /// Create the rule (disabled) unless it already exists.
    pub fn ensure(&self) -> Result<EnsureOutcome> {
        self.ensure_status().map(|(outcome, _)| outcome)
    }

    /// Like [`ensure`](Self::ensure), also returning the rule status
    /// afterwards.
    pub fn ensure_status(&self) -> Result<(EnsureOutcome, RuleStatus)> {
        let current = self.status()?;
        if current != RuleStatus::NotFound {
            debug!(rule = %self.rule.name, %current, "rule already present");
            return Ok((EnsureOutcome::AlreadyPresent, current));
        }
        self.create()?;
        Ok((EnsureOutcome::Created, RuleStatus::Disabled))
    }

    /// Enable the rule, cutting the program's outbound traffic.
    pub fn block(&self) -> Result<ToggleOutcome> {
        let current = self.status()?;
        self.block_from(current)
    }

    /// Disable the rule, restoring the program's outbound traffic.
    pub fn allow(&self) -> Result<ToggleOutcome> {
        let current = self.status()?;
        self.allow_from(current)
    }

    /// Block when traffic is allowed, allow when it is blocked.
    pub fn toggle(&self) -> Result<ToggleOutcome> {
        match self.status()? {
            RuleStatus::Enabled => self.allow_from(RuleStatus::Enabled),
            current => self.block_from(current),
        }
    }

    fn block_from(&self, current: RuleStatus) -> Result<ToggleOutcome> {
        match current {
            RuleStatus::Enabled => Ok(ToggleOutcome::Unchanged { status: current }),
            RuleStatus::NotFound => {
                self.create()?;
                self.set_enabled(true)?;
                Ok(ToggleOutcome::Changed {
                    from: current,
                    to: RuleStatus::Enabled,
                })
            }
            RuleStatus::Disabled => {
                self.set_enabled(true)?;
                Ok(ToggleOutcome::Changed {
                    from: current,
                    to: RuleStatus::Enabled,
                })
            }
        }
    }

    fn allow_from(&self, current: RuleStatus) -> Result<ToggleOutcome> {
        match current {
            RuleStatus::Disabled | RuleStatus::NotFound => {
                Ok(ToggleOutcome::Unchanged { status: current })
            }
            RuleStatus::Enabled => {
                self.set_enabled(false)?;
                Ok(ToggleOutcome::Changed {
                    from: current,
                    to: RuleStatus::Disabled,
                })
            }
        }
    }

    fn create(&self) -> Result<()> {
        let args = netsh::add_args(&self.rule);
        let output = self.runner.run(netsh::NETSH, &args)?;
        netsh::check(output, &args)?;
        info!(
            rule = %self.rule.name,
            program = %self.rule.program,
            "created outbound block rule (disabled)"
        );
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        let args = netsh::set_enabled_args(&self.rule.name, enabled);
        let output = self.runner.run(netsh::NETSH, &args)?;
        netsh::check(output, &args)?;
        if enabled {
            info!(rule = %self.rule.name, "rule enabled, network blocked");
        } else {
            info!(rule = %self.rule.name, "rule disabled, network allowed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirewallError;
    use crate::runner::CommandOutput;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned outputs in order and records every invocation.
    #[derive(Default)]
    struct ScriptedRunner {
        replies: RefCell<VecDeque<CommandOutput>>,
        calls: RefCell<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn with(replies: Vec<CommandOutput>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: RefCell::default(),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            Ok(self.replies.borrow_mut().pop_front().unwrap_or_default())
        }
    }

    fn out(status: i32, stdout: &str) -> CommandOutput {
        CommandOutput {
            status: Some(status),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn show(enabled: &str) -> CommandOutput {
        out(
            0,
            &format!("Rule Name: SteamShareLibrary\n---\nEnabled: {enabled}\nOk.\n"),
        )
    }

    fn no_match() -> CommandOutput {
        out(1, "No rules match the specified criteria.\n")
    }

    fn ok() -> CommandOutput {
        out(0, "Ok.\n")
    }

    fn rule() -> RuleSpec {
        RuleSpec::outbound_block("SteamShareLibrary", r"C:\Steam\steam.exe")
    }

    fn manager(runner: &ScriptedRunner) -> RuleManager<&ScriptedRunner> {
        RuleManager::new(runner, rule(), ProbeBackend::Netsh)
    }

    fn verb(call: &(String, Vec<String>)) -> &str {
        call.1.get(2).map(String::as_str).unwrap_or("")
    }

    #[test]
    fn test_status_via_netsh() {
        let runner = ScriptedRunner::with(vec![show("Yes")]);
        assert_eq!(manager(&runner).status().unwrap(), RuleStatus::Enabled);
        let calls = runner.calls();
        assert_eq!(calls[0].0, "netsh");
        assert_eq!(verb(&calls[0]), "show");
    }

    #[test]
    fn test_status_via_powershell() {
        let runner = ScriptedRunner::with(vec![out(0, "False\r\n")]);
        let mgr = RuleManager::new(&runner, rule(), ProbeBackend::PowerShell);
        assert_eq!(mgr.status().unwrap(), RuleStatus::Disabled);
        assert_eq!(runner.calls()[0].0, "powershell.exe");
    }

    #[test]
    fn test_ensure_creates_missing_rule() {
        let runner = ScriptedRunner::with(vec![no_match(), ok()]);
        assert_eq!(manager(&runner).ensure().unwrap(), EnsureOutcome::Created);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(verb(&calls[1]), "add");
        assert!(calls[1].1.contains(&"enable=no".to_string()));
    }

    #[test]
    fn test_ensure_leaves_existing_rule() {
        let runner = ScriptedRunner::with(vec![show("No")]);
        assert_eq!(
            manager(&runner).ensure().unwrap(),
            EnsureOutcome::AlreadyPresent
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_block_already_enabled_is_noop() {
        let runner = ScriptedRunner::with(vec![show("Yes")]);
        let outcome = manager(&runner).block().unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Unchanged {
                status: RuleStatus::Enabled
            }
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_block_disabled_rule() {
        let runner = ScriptedRunner::with(vec![show("No"), ok()]);
        let outcome = manager(&runner).block().unwrap();
        assert_eq!(outcome.status(), RuleStatus::Enabled);
        let calls = runner.calls();
        assert_eq!(verb(&calls[1]), "set");
        assert_eq!(calls[1].1.last().unwrap(), "enable=yes");
    }

    #[test]
    fn test_block_missing_rule_creates_then_enables() {
        let runner = ScriptedRunner::with(vec![no_match(), ok(), ok()]);
        let outcome = manager(&runner).block().unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Changed {
                from: RuleStatus::NotFound,
                to: RuleStatus::Enabled
            }
        );
        let verbs: Vec<String> = runner.calls().iter().map(|c| verb(c).to_string()).collect();
        assert_eq!(verbs, ["show", "add", "set"]);
    }

    #[test]
    fn test_allow_missing_rule_is_noop() {
        let runner = ScriptedRunner::with(vec![no_match()]);
        let outcome = manager(&runner).allow().unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Unchanged {
                status: RuleStatus::NotFound
            }
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_allow_enabled_rule() {
        let runner = ScriptedRunner::with(vec![show("Yes"), ok()]);
        let outcome = manager(&runner).allow().unwrap();
        assert_eq!(outcome.status(), RuleStatus::Disabled);
        assert_eq!(runner.calls()[1].1.last().unwrap(), "enable=no");
    }

    #[test]
    fn test_toggle_flips_both_ways() {
        let runner = ScriptedRunner::with(vec![show("Yes"), ok()]);
        assert_eq!(
            manager(&runner).toggle().unwrap().status(),
            RuleStatus::Disabled
        );

        let runner = ScriptedRunner::with(vec![show("No"), ok()]);
        assert_eq!(
            manager(&runner).toggle().unwrap().status(),
            RuleStatus::Enabled
        );
    }

    #[test]
    fn test_set_failure_surfaces_elevation() {
        let runner = ScriptedRunner::with(vec![
            show("No"),
            out(
                1,
                "The requested operation requires elevation (Run as administrator).\n",
            ),
        ]);
        let err = manager(&runner).block().unwrap_err();
        assert!(matches!(err, FirewallError::ElevationRequired));
    }

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_failed_powershell_status_blocks_nothing() {
        let runner = ScriptedRunner::with(vec![failed(
            "Get-NetFirewallRule : The term 'Get-NetFirewallRule' is not recognized",
        )]);
        let mgr = RuleManager::new(&runner, rule(), ProbeBackend::PowerShell);
        let err = mgr.block().unwrap_err();
        assert!(matches!(err, FirewallError::CommandFailed { .. }));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls.iter().all(|c| verb(c) != "add"));
    }

    #[test]
    fn test_failed_netsh_status_is_not_a_missing_rule() {
        let runner = ScriptedRunner::with(vec![failed("The RPC server is unavailable.")]);
        assert!(manager(&runner).status().is_err());

        let runner = ScriptedRunner::with(vec![failed("The RPC server is unavailable.")]);
        assert!(manager(&runner).toggle().is_err());
        assert_eq!(runner.calls().len(), 1);

        let runner = ScriptedRunner::with(vec![failed("The RPC server is unavailable.")]);
        assert!(manager(&runner).ensure().is_err());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_ensure_status_reports_final_state() {
        let runner = ScriptedRunner::with(vec![show("Yes")]);
        assert_eq!(
            manager(&runner).ensure_status().unwrap(),
            (EnsureOutcome::AlreadyPresent, RuleStatus::Enabled)
        );

        let runner = ScriptedRunner::with(vec![no_match(), ok()]);
        assert_eq!(
            manager(&runner).ensure_status().unwrap(),
            (EnsureOutcome::Created, RuleStatus::Disabled)
        );
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("netsh".parse::<ProbeBackend>(), Ok(ProbeBackend::Netsh));
        assert_eq!(
            "PowerShell".parse::<ProbeBackend>(),
            Ok(ProbeBackend::PowerShell)
        );
        assert!("wmi".parse::<ProbeBackend>().is_err());
    }
}
