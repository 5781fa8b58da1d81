//! `netsh advfirewall` command surface: argument builders and the parser
//! for `show rule` output.

use crate::error::{FirewallError, Result};
use crate::rule::{RuleSpec, RuleStatus};
use crate::runner::CommandOutput;

pub const NETSH: &str = "netsh";

// English and German netsh field labels.
const NAME_KEYS: &[&str] = &["Rule Name", "Regelname"];
const ENABLED_KEYS: &[&str] = &["Enabled", "Aktiviert"];
const YES_VALUES: &[&str] = &["Yes", "Ja"];

// Lowercased fragments of netsh's "no rules match" reply, English and German.
const NO_MATCH_MARKERS: &[&str] = &["no rules match the specified criteria", "keine regeln"];

const ELEVATION_MARKERS: &[&str] = &["requires elevation", "run as administrator"];

fn base_args(verb: &str) -> Vec<String> {
    vec![
        "advfirewall".to_string(),
        "firewall".to_string(),
        verb.to_string(),
        "rule".to_string(),
    ]
}

/// `netsh advfirewall firewall show rule name=<name>`
pub fn show_args(name: &str) -> Vec<String> {
    let mut args = base_args("show");
    args.push(format!("name={name}"));
    args
}

/// `netsh advfirewall firewall add rule ...`. The rule is created disabled,
/// so adding it never cuts the program off.
pub fn add_args(rule: &RuleSpec) -> Vec<String> {
    let mut args = base_args("add");
    args.push(format!("name={}", rule.name));
    args.push(format!("dir={}", rule.direction.as_netsh()));
    args.push(format!("action={}", rule.action.as_netsh()));
    args.push(format!("program={}", rule.program));
    args.push("enable=no".to_string());
    args
}

/// `netsh advfirewall firewall set rule name=<name> new enable=yes|no`
pub fn set_enabled_args(name: &str, enabled: bool) -> Vec<String> {
    let mut args = base_args("set");
    args.push(format!("name={name}"));
    args.push("new".to_string());
    args.push(format!("enable={}", if enabled { "yes" } else { "no" }));
    args
}

/// Derive the rule status from `show rule` output.
///
/// Output is a sequence of `Key: Value` blocks, each opened by a rule name
/// line. If no block names the rule but the raw text still mentions it, the
/// rule is treated as present and the first `Enabled` line decides.
pub fn parse_show_output(output: &str, name: &str) -> RuleStatus {
    if name.trim().is_empty() {
        return RuleStatus::NotFound;
    }

    let mut in_match = false;
    let mut matched = false;
    let mut enabled = false;
    let mut any_enabled_line = false;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if NAME_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key)) {
            in_match = value.eq_ignore_ascii_case(name.trim());
            matched |= in_match;
        } else if ENABLED_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key)) {
            let yes = YES_VALUES.iter().any(|y| y.eq_ignore_ascii_case(value));
            if in_match && yes {
                enabled = true;
            }
            any_enabled_line |= yes;
        }
    }

    if !matched {
        if is_no_match(output) || !output.to_lowercase().contains(&name.trim().to_lowercase()) {
            return RuleStatus::NotFound;
        }
        enabled = any_enabled_line;
    }

    if enabled {
        RuleStatus::Enabled
    } else {
        RuleStatus::Disabled
    }
}

/// Whether the output is netsh's reply for a rule name that matches nothing.
pub fn is_no_match(output: &str) -> bool {
    let text = output.to_lowercase();
    NO_MATCH_MARKERS.iter().any(|m| text.contains(m))
}

/// Status from a finished `show rule` invocation. A non-zero exit counts as
/// "not found" only when netsh says no rule matched; anything else is an
/// error.
pub fn show_status(output: &CommandOutput, args: &[String], name: &str) -> Result<RuleStatus> {
    if output.success() || is_no_match(&output.stdout) {
        return Ok(parse_show_output(&output.stdout, name));
    }
    Err(failure(output, args))
}

/// Whether netsh refused the command for lack of administrator rights.
pub fn needs_elevation(output: &CommandOutput) -> bool {
    let text = format!("{}\n{}", output.stdout, output.stderr).to_lowercase();
    ELEVATION_MARKERS.iter().any(|m| text.contains(m))
}

/// Turn a finished netsh invocation into a result.
pub fn check(output: CommandOutput, args: &[String]) -> Result<CommandOutput> {
    if needs_elevation(&output) {
        return Err(FirewallError::ElevationRequired);
    }
    if !output.success() {
        return Err(failure(&output, args));
    }
    Ok(output)
}

fn failure(output: &CommandOutput, args: &[String]) -> FirewallError {
    FirewallError::CommandFailed {
        program: NETSH.to_string(),
        args: args.join(" "),
        code: output.status,
        message: output.message().to_string(),
    }
}
