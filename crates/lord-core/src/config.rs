//! lord.toml configuration parser.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! The loaded values are handed to the controller at startup and never
//! re-read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LordConfig {
    pub limits: Limits,
    pub teardown: TeardownPolicy,
    pub runtime: RuntimeSettings,
}

/// Per-service capacity limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_instances: usize,
    pub max_nodes: usize,
    pub max_load_balancers: usize,
    /// Highest port a load balancer may serve on (inclusive).
    pub max_port: u16,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_instances: 64,
            max_nodes: 16,
            max_load_balancers: 4,
            max_port: u16::MAX,
        }
    }
}

/// How long the controller waits for a stopped container to disappear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeardownPolicy {
    /// Sleep between stop/poll rounds, in milliseconds.
    pub backoff_ms: u64,
    /// Stop/poll rounds before giving up.
    pub max_attempts: u32,
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            max_attempts: 30,
        }
    }
}

impl TeardownPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Settings for the container engine adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Container engine CLI binary.
    pub binary: String,
    /// Root directory holding one build context per image reference.
    pub build_context: PathBuf,
    /// Upper bound for any single runtime call, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            build_context: PathBuf::from("."),
            call_timeout_secs: 120,
        }
    }
}

impl RuntimeSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl LordConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: LordConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// All numeric settings must be positive.
    pub fn validate(&self) -> anyhow::Result<()> {
        let checks: [(&str, u64); 8] = [
            ("limits.max_instances", self.limits.max_instances as u64),
            ("limits.max_nodes", self.limits.max_nodes as u64),
            ("limits.max_load_balancers", self.limits.max_load_balancers as u64),
            ("limits.max_port", u64::from(self.limits.max_port)),
            ("teardown.backoff_ms", self.teardown.backoff_ms),
            ("teardown.max_attempts", u64::from(self.teardown.max_attempts)),
            ("runtime.call_timeout_secs", self.runtime.call_timeout_secs),
            ("runtime.binary", self.runtime.binary.trim().len() as u64),
        ];
        for (key, value) in checks {
            if value == 0 {
                bail!("{key} must be positive");
            }
        }
        Ok(())
    }
}
