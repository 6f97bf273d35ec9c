//! Configuration stored under `<data-dir>/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::blocklist::Blocklist;

/// Languages with a bundled message catalog.
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "ru"];

/// Application configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values
/// documented on each field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Message catalog language (`en` or `ru`).
    pub language: String,

    /// Pause after each dispatched command, in milliseconds. `0` disables it.
    pub command_delay_ms: u64,

    /// Leading-token prefixes that are never dispatched.
    pub blocked_commands: Vec<String>,

    pub fetch: FetchConfig,

    pub timeouts: TimeoutConfig,

    pub host: HostConfig,

    /// Granted permission nodes per interactive actor id.
    pub permissions: BTreeMap<String, Vec<String>>,

    /// Per-language message template overrides (`messages.<lang>.<key>`).
    pub messages: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    /// Host that short-code references expand against (`<raw_host>/raw/<code>`).
    pub raw_host: String,
    /// `User-Agent` sent with every fetch.
    pub user_agent: String,
    /// URL probed before `run` to check that the network is up.
    pub reachability_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub read_ms: u64,
    pub internet_check_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    /// Shell prefix; the command string is appended as the last argument.
    pub shell: Vec<String>,
    /// Wall-clock limit for a single dispatched command.
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            raw_host: "https://pastebin.com".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            reachability_url: "https://google.com".to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            read_ms: 10_000,
            internet_check_ms: 3_000,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            shell: vec!["sh".to_string(), "-c".to_string()],
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            command_delay_ms: 100,
            blocked_commands: Vec::new(),
            fetch: FetchConfig::default(),
            timeouts: TimeoutConfig::default(),
            host: HostConfig::default(),
            permissions: BTreeMap::new(),
            messages: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_LANGUAGES.contains(&self.language.as_str()) {
            return Err(anyhow!(
                "language must be one of {}",
                SUPPORTED_LANGUAGES.join(", ")
            ));
        }
        if self.timeouts.connect_ms == 0 || self.timeouts.read_ms == 0 {
            return Err(anyhow!("timeouts.connect_ms and timeouts.read_ms must be > 0"));
        }
        if self.timeouts.internet_check_ms == 0 {
            return Err(anyhow!("timeouts.internet_check_ms must be > 0"));
        }
        if self.blocked_commands.iter().any(|cmd| cmd.trim().is_empty()) {
            return Err(anyhow!("blocked_commands must not contain blank entries"));
        }
        if self.host.shell.is_empty() || self.host.shell[0].trim().is_empty() {
            return Err(anyhow!("host.shell must be a non-empty array"));
        }
        if self.host.timeout_secs == 0 {
            return Err(anyhow!("host.timeout_secs must be > 0"));
        }
        if self.host.output_limit_bytes == 0 {
            return Err(anyhow!("host.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn blocklist(&self) -> Blocklist {
        Blocklist::new(&self.blocked_commands)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn permissions_for(&self, actor_id: &str) -> Vec<String> {
        self.permissions.get(actor_id).cloned().unwrap_or_default()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Load config, writing the defaulted result back if the file did not exist.
pub fn load_or_init_config(path: &Path) -> Result<AppConfig> {
    let existed = path.exists();
    let cfg = load_config(path)?;
    if !existed {
        write_config(path, &cfg)?;
    }
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
