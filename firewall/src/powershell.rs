//! Status probe through PowerShell's `Get-NetFirewallRule`.

use crate::error::{FirewallError, Result};
use crate::rule::RuleStatus;
use crate::runner::CommandOutput;

pub const POWERSHELL: &str = "powershell.exe";

/// Arguments that print the rule's `Enabled` property (`True`/`False`),
/// one line per rule with that display name.
pub fn probe_args(name: &str) -> Vec<String> {
    let quoted = name.replace('\'', "''");
    vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        format!(
            "Get-NetFirewallRule -DisplayName '{quoted}' -ErrorAction SilentlyContinue \
             | Select-Object -ExpandProperty Enabled"
        ),
    ]
}

/// Status from a finished query. `-ErrorAction SilentlyContinue` makes a
/// missing rule exit 0 with no output, so a non-zero exit or anything on
/// stderr is a failed query rather than a missing rule.
pub fn query_status(output: &CommandOutput, args: &[String]) -> Result<RuleStatus> {
    if !output.success() || !output.stderr.trim().is_empty() {
        return Err(FirewallError::CommandFailed {
            program: POWERSHELL.to_string(),
            args: args.join(" "),
            code: output.status,
            message: output.message().to_string(),
        });
    }
    Ok(parse_probe_output(&output.stdout))
}

pub fn parse_probe_output(output: &str) -> RuleStatus {
    let mut status = RuleStatus::NotFound;
    for line in output.lines().map(str::trim) {
        if line.eq_ignore_ascii_case("true") {
            return RuleStatus::Enabled;
        }
        if line.eq_ignore_ascii_case("false") {
            status = RuleStatus::Disabled;
        }
    }
    status
}
