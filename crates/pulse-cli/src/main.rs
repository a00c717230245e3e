//! Pulse CLI entry point

use clap::Parser;
use tracing::{error, info, Level};

use pulse_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load and validate configuration
    let config = load_configuration(&cli)?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    setup_logging(level);

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("Pulse CLI exited successfully");
    Ok(())
}

/// Setup logging at the given level
fn setup_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults, then apply overrides
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default(),
    };

    config.apply_env_overrides();
    if let Some(preset) = &cli.preset {
        config.apply_preset(preset)?;
    }

    config.validate()?;
    Ok(config)
}
