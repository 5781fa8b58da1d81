//! familyshare configuration loading and parsing

use anyhow::{bail, Context, Result};
use familyshare_firewall::{ProbeBackend, RuleSpec};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "familyshare.toml";
const CONFIG_ENV: &str = "FAMILYSHARE_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct FamilyshareConfig {
    #[serde(default)]
    pub rule: RuleConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_rule_name")]
    pub name: String,
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_expected_file_name")]
    pub expected_file_name: String,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            name: default_rule_name(),
            program: default_program(),
            expected_file_name: default_expected_file_name(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub backend: ProbeBackend,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            backend: ProbeBackend::default(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_rule_name() -> String { "SteamShareLibrary".into() }
fn default_program() -> String { r"C:\Program Files (x86)\Steam\steam.exe".into() }
fn default_expected_file_name() -> String { "steam.exe".into() }
fn default_poll_interval() -> u64 { 1000 }
fn default_log_level() -> String { "info".into() }

/// Values given on the command line take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub rule_name: Option<String>,
    pub program: Option<String>,
    pub backend: Option<ProbeBackend>,
}

impl FamilyshareConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(name) = overrides.rule_name {
            self.rule.name = name;
        }
        if let Some(program) = overrides.program {
            self.rule.program = program;
        }
        if let Some(backend) = overrides.backend {
            self.probe.backend = backend;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rule.name.trim().is_empty() {
            bail!("rule.name must not be empty");
        }
        if self.probe.poll_interval_ms == 0 {
            bail!("probe.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn rule_spec(&self) -> RuleSpec {
        RuleSpec::outbound_block(self.rule.name.trim(), self.rule.program.trim())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.probe.poll_interval_ms)
    }
}

/// Resolve the config path: explicit flag, then `FAMILYSHARE_CONFIG`,
/// then `familyshare.toml` in the working directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

/// Load configuration from `path`. A missing file yields defaults unless the
/// path was given explicitly; the returned flag says whether the file was read.
///
/// Runs before the tracing subscriber exists, so the caller reports the
/// fallback to defaults.
pub fn load_config(path: &Path, required: bool) -> Result<(FamilyshareConfig, bool)> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: FamilyshareConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok((config, true))
    } else if required {
        bail!("Config file not found at {}", path.display());
    } else {
        Ok((FamilyshareConfig::default(), false))
    }
}
