//! Error handling for the Pulse CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Pulse error: {0}")]
    Pulse(#[from] pulse_core::PulseError),

    #[error("Progress error: {0}")]
    Progress(#[from] pulse_core::ProgressError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scenario {scenario} failed: {reason}")]
    ScenarioFailed {
        scenario: &'static str,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML rendering error: {0}")]
    TomlRendering(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<pulse_core::TransportError> for CliError {
    fn from(err: pulse_core::TransportError) -> Self {
        CliError::Pulse(err.into())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(format!("{err:#}"))
    }
}
