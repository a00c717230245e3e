//! Command handlers for the Pulse CLI

use std::path::Path;

use tracing::{info, warn};

use pulse_core::{ChannelContract, ContractEntry, Visibility};

use crate::cli::{Cli, Commands, Scenario};
use crate::config::{AppConfig, PRESETS};
use crate::error::{CliError, Result};
use crate::recompute::{self, Snapshot};
use crate::scenarios::{self, ScenarioReport};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Channels { json } => Self::handle_channels_command(&config, json),
            Commands::Simulate { scenario } => {
                Self::handle_simulate_command(&config, scenario).await
            }
            Commands::Recompute {
                input,
                skip_xp_sync,
            } => Self::handle_recompute_command(&config, &input, skip_xp_sync),
            Commands::Config { presets } => Self::handle_config_command(&config, presets),
        }
    }

    /// Print the channel/event contract
    fn handle_channels_command(config: &AppConfig, json: bool) -> Result<()> {
        let contract = ChannelContract::new(&config.pulse.contract);
        let entries: Vec<&ContractEntry> = contract.entries().collect();

        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        println!("{:<24} {:<18} {:<8} CHANNEL", "EVENT", "ENTITY", "ACCESS");
        for entry in entries {
            println!(
                "{:<24} {:<18} {:<8} {}",
                entry.event.as_str(),
                entry.kind.as_str(),
                visibility_label(entry.visibility),
                entry.channel_pattern
            );
        }
        Ok(())
    }

    /// Run one or all scenarios against a fresh in-memory fabric
    async fn handle_simulate_command(
        config: &AppConfig,
        scenario: Option<Scenario>,
    ) -> Result<()> {
        let reports = match scenario {
            Some(scenario) => vec![scenarios::run(scenario, &config.pulse).await],
            None => scenarios::run_all(&config.pulse).await,
        };

        for report in &reports {
            print_report(report);
        }

        let failed: Vec<&ScenarioReport> = reports.iter().filter(|r| !r.passed).collect();
        match failed.first() {
            None => {
                info!(scenarios = reports.len(), "All scenarios passed");
                Ok(())
            }
            Some(first) => {
                warn!(failed = failed.len(), "Scenarios failed");
                Err(CliError::ScenarioFailed {
                    scenario: first.scenario,
                    reason: first.detail.clone(),
                })
            }
        }
    }

    /// Retroactive recompute over a snapshot file
    fn handle_recompute_command(
        config: &AppConfig,
        input: &Path,
        skip_xp_sync: bool,
    ) -> Result<()> {
        info!("Loading activity snapshot from: {}", input.display());
        let snapshot = Snapshot::load(input)?;
        let outcome = recompute::recompute(&snapshot, &config.pulse.progress, !skip_xp_sync)?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        Ok(())
    }

    /// Show the effective configuration or the preset names
    fn handle_config_command(config: &AppConfig, presets: bool) -> Result<()> {
        if presets {
            for name in PRESETS {
                println!("{name}");
            }
            return Ok(());
        }

        print!("{}", config.to_toml()?);
        Ok(())
    }
}

fn visibility_label(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Scoped => "scoped",
        Visibility::Private => "private",
    }
}

fn print_report(report: &ScenarioReport) {
    let status = if report.passed { "ok" } else { "FAILED" };
    println!("{:<26} {:<6} {}", report.scenario, status, report.detail);
}
