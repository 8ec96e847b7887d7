//! Engine settings
//!
//! Read from `~/.config/stackweave/settings.yaml`. Every key is optional;
//! missing keys keep their defaults.
//!
//! ```yaml
//! retry:
//!   max-attempts: 5
//!   initial-delay-ms: 500
//! certificate:
//!   interval-secs: 15
//!   timeout-secs: 2700
//! max-concurrency: 8
//! edge-region: us-east-1
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Interval and overall budget of a polling loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_deployment() -> PollSettings {
    PollSettings {
        interval_secs: 5,
        timeout_secs: 15 * 60,
    }
}

fn default_certificate() -> PollSettings {
    PollSettings {
        interval_secs: 10,
        timeout_secs: 30 * 60,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSettings {
    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default = "default_deployment")]
    pub deployment: PollSettings,

    #[serde(default = "default_certificate")]
    pub certificate: PollSettings,

    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Region hosting certificates for edge distributions
    #[serde(default)]
    pub edge_region: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            deployment: default_deployment(),
            certificate: default_certificate(),
            max_concurrency: None,
            edge_region: None,
        }
    }
}

impl EngineSettings {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stackweave").join(SETTINGS_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&content)?;
        settings.validate().map_err(|message| ConfigError::InvalidSettings {
            path: path.display().to_string(),
            message,
        })?;
        tracing::debug!(path = %path.display(), "Loaded engine settings");
        Ok(settings)
    }

    /// Parse settings; an empty document yields the defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.retry.max_attempts == 0 {
            return Err("retry.max-attempts must be at least 1".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("retry.backoff-multiplier must be at least 1".to_string());
        }
        for (name, poll) in [("deployment", &self.deployment), ("certificate", &self.certificate)] {
            if poll.interval_secs == 0 {
                return Err(format!("{}.interval-secs must be positive", name));
            }
            if poll.timeout_secs < poll.interval_secs {
                return Err(format!("{}.timeout-secs is shorter than its interval", name));
            }
        }
        if self.max_concurrency == Some(0) {
            return Err("max-concurrency must be positive".to_string());
        }
        Ok(())
    }
}
