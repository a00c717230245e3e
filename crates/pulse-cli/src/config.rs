//! Pulse CLI Configuration Management
//!
//! Configuration is layered, lowest priority first:
//! - built-in defaults
//! - a TOML file (`--config`)
//! - `PULSE_*` environment variables
//! - command line flags (`--preset`, `--verbose`)

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::Level;

use pulse_core::PulseConfig;

use crate::error::{CliError, Result};

/// Environment variable overriding `log.level`
pub const LOG_LEVEL_ENV: &str = "PULSE_LOG_LEVEL";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub pulse: PulseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Parse a TOML document over the defaults
    pub fn from_toml_str(document: &str) -> Result<Self> {
        Ok(toml::from_str(document)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&document)
    }

    /// Apply `PULSE_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            self.log.level = level.trim().to_ascii_lowercase();
        }
    }

    /// Replace the fabric section with a named preset
    pub fn apply_preset(&mut self, name: &str) -> Result<()> {
        self.pulse = PulseConfig::preset(name).ok_or_else(|| {
            CliError::Config(format!(
                "Unknown preset '{name}' (expected one of: {})",
                PRESETS.join(", ")
            ))
        })?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level> {
        self.log
            .level
            .parse::<Level>()
            .map_err(|_| CliError::Config(format!("Invalid log level '{}'", self.log.level)))
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.log_level()?;
        self.pulse.validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Preset names accepted by `--preset`
pub const PRESETS: [&str; 4] = ["default", "high-throughput", "conservative", "testing"];
