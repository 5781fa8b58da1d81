//! familyshare — block or allow a game client's network access
//!
//! Manages one outbound Windows Firewall block rule for the configured
//! program (Steam by default):
//! - `status` reports whether the rule is enabled, disabled or missing
//! - `ensure` creates the rule, disabled, when it is missing
//! - `block` / `allow` / `toggle` enable or disable it
//! - `watch` polls the rule and prints every change until Ctrl-C

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use familyshare_firewall::{ProbeBackend, RuleManager, SystemRunner};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod report;
mod watch;

use config::Overrides;
use report::{EnsureReport, StatusReport, ToggleReport};

#[derive(Debug, Parser)]
#[command(
    name = "familyshare",
    version,
    about = "Toggle an outbound firewall block rule for a game client"
)]
struct Cli {
    /// Configuration file (defaults to $FAMILYSHARE_CONFIG, then ./familyshare.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Firewall rule name
    #[arg(long = "rule-name", global = true)]
    rule_name: Option<String>,

    /// Path of the program the rule applies to
    #[arg(long, global = true)]
    program: Option<String>,

    /// Status probe: netsh or powershell
    #[arg(long, global = true)]
    backend: Option<ProbeBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the rule status and the program's network state
    Status,
    /// Create the rule (disabled) if it does not exist
    Ensure,
    /// Enable the rule, blocking the program's network access
    Block,
    /// Disable the rule, allowing the program's network access
    Allow,
    /// Block if allowed, allow if blocked
    Toggle,
    /// Poll the rule and report every status change until Ctrl-C
    Watch {
        /// Stop after this many polls
        #[arg(long)]
        count: Option<u64>,

        /// Poll interval in milliseconds (overrides probe.poll_interval_ms)
        #[arg(long = "interval-ms")]
        interval_ms: Option<u64>,

        /// Create the rule first if it is missing
        #[arg(long)]
        ensure: bool,
    },
}

impl Commands {
    /// Commands that may create the rule, and so need a valid program path.
    fn may_create_rule(&self) -> bool {
        matches!(
            self,
            Commands::Ensure
                | Commands::Block
                | Commands::Toggle
                | Commands::Watch { ensure: true, .. }
        )
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let path = config::config_path(cli.config.as_deref());
    let (mut config, found) = config::load_config(&path, cli.config.is_some())?;

    init_logging(&config.logging.level)?;
    if !found {
        warn!("Config file not found at {}, using defaults", path.display());
    }

    config.apply(Overrides {
        rule_name: cli.rule_name,
        program: cli.program,
        backend: cli.backend,
    });
    if let Commands::Watch {
        interval_ms: Some(ms),
        ..
    } = cli.command
    {
        config.probe.poll_interval_ms = ms;
    }
    config.validate()?;

    let rule = config.rule_spec();
    if cli.command.may_create_rule() {
        rule.validate_program(&config.rule.expected_file_name)?;
    }

    let manager = RuleManager::new(SystemRunner, rule, config.probe.backend);
    let json = cli.json;

    match cli.command {
        Commands::Status => {
            let status = manager.status().context("Error checking rule status")?;
            let report = StatusReport::new(manager.rule(), status, Utc::now());
            report::emit(json, &report, || report.text())
        }
        Commands::Ensure => {
            let (outcome, status) = manager
                .ensure_status()
                .context("Error creating firewall rule")?;
            let report = EnsureReport::new(manager.rule(), outcome, status, Utc::now());
            report::emit(json, &report, || report.text())
        }
        Commands::Block => {
            let outcome = manager.block().context("Error blocking network access")?;
            let report = ToggleReport::new(manager.rule(), outcome, Utc::now());
            report::emit(json, &report, || report.text())
        }
        Commands::Allow => {
            let outcome = manager.allow().context("Error allowing network access")?;
            let report = ToggleReport::new(manager.rule(), outcome, Utc::now());
            report::emit(json, &report, || report.text())
        }
        Commands::Toggle => {
            let outcome = manager.toggle().context("Error toggling firewall rule")?;
            let report = ToggleReport::new(manager.rule(), outcome, Utc::now());
            report::emit(json, &report, || report.text())
        }
        Commands::Watch { count, ensure, .. } => {
            if ensure {
                let outcome = manager.ensure().context("Error creating firewall rule")?;
                info!(rule = %manager.rule().name, ?outcome, "rule checked before watching");
            }
            let options = watch::WatchOptions {
                interval: config.poll_interval(),
                max_polls: count,
            };
            run_watch(Arc::new(manager), options, json)
        }
    }
}

fn run_watch(
    manager: Arc<RuleManager<SystemRunner>>,
    options: watch::WatchOptions,
    json: bool,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let rule = manager.rule().clone();
    let summary = runtime.block_on(async move {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };

        watch::watch(manager, options, shutdown, |change| {
            let report = report::change_report(&rule, change);
            if let Err(e) = report::emit(json, &report, || {
                format!("[{}] {}", report.checked_at, report.text())
            }) {
                warn!("Failed to print status: {e:#}");
            }
        })
        .await
    })?;

    info!(
        polls = summary.polls,
        changes = summary.changes,
        errors = summary.errors,
        "watch finished"
    );
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level `{level}`"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_flags() {
        let cli = Cli::try_parse_from([
            "familyshare",
            "--backend",
            "powershell",
            "watch",
            "--count",
            "3",
            "--interval-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(ProbeBackend::PowerShell));
        match cli.command {
            Commands::Watch {
                count,
                interval_ms,
                ensure,
            } => {
                assert_eq!(count, Some(3));
                assert_eq!(interval_ms, Some(250));
                assert!(!ensure);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["familyshare", "status", "--json", "--rule-name", "X"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.rule_name.as_deref(), Some("X"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["familyshare", "--backend", "wmi", "status"]).is_err());
    }

    #[test]
    fn test_mutating_commands_need_valid_program() {
        assert!(Commands::Block.may_create_rule());
        assert!(Commands::Toggle.may_create_rule());
        assert!(!Commands::Allow.may_create_rule());
        assert!(!Commands::Status.may_create_rule());
        assert!(!Commands::Watch {
            count: None,
            interval_ms: None,
            ensure: false
        }
        .may_create_rule());
    }
}
