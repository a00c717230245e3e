//! Pulse CLI library
//!
//! Command-line front end for the Pulse broadcast fabric: prints the
//! channel contract, runs end-to-end scenarios against the in-memory broker,
//! and performs retroactive progress recomputes over activity snapshots.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod recompute;
pub mod scenarios;

pub use cli::{Cli, Commands, Scenario};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use recompute::{RecomputeOutcome, Snapshot};
pub use scenarios::ScenarioReport;
