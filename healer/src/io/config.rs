//! Healer configuration stored as TOML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Per-stream cap on captured stdout/stderr.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1024 * 1024;

/// Healer configuration (TOML).
///
/// Missing fields default to the values documented on each field, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealerConfig {
    /// Remediation rounds allowed after the first attempt.
    pub max_retries: u32,

    /// Backoff before the second attempt; doubles after every later failure.
    pub initial_retry_delay_ms: u64,

    /// Cap on a single backoff sleep.
    pub max_retry_delay_ms: u64,

    /// Per-attempt wall-clock limit when the caller does not supply one.
    pub default_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Query the memory store for prior solutions before the first attempt.
    pub use_memory_search: bool,

    /// Distro override. Detected from `/etc/os-release` when unset.
    pub distro: Option<String>,

    pub memory: MemoryConfig,

    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub search_limit: usize,
    pub min_score: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            search_limit: 3,
            min_score: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallConfig {
    /// Prefix package-manager invocations with `sudo`.
    pub sudo: bool,
    pub timeout_secs: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            sudo: true,
            timeout_secs: 600,
        }
    }
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            default_timeout_secs: 30,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            use_memory_search: true,
            distro: None,
            memory: MemoryConfig::default(),
            install: InstallConfig::default(),
        }
    }
}

impl HealerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(anyhow!("default_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(anyhow!(
                "initial_retry_delay_ms must be <= max_retry_delay_ms"
            ));
        }
        if !(0.0..=1.0).contains(&self.memory.min_score) {
            return Err(anyhow!("memory.min_score must be within 0.0..=1.0"));
        }
        if self.install.timeout_secs == 0 {
            return Err(anyhow!("install.timeout_secs must be > 0"));
        }
        if self
            .distro
            .as_deref()
            .is_some_and(|distro| distro.trim().is_empty())
        {
            return Err(anyhow!("distro must be non-empty when set"));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HealerConfig::default()`.
pub fn load_config(path: &Path) -> Result<HealerConfig> {
    if !path.exists() {
        let cfg = HealerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HealerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HealerConfig) -> Result<()> {
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
