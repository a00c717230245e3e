//! Argument parsing and command plumbing for the `pulse` binary

use clap::Parser;

use pulse_cli::{recompute, AppConfig, Cli, Commands, Scenario, Snapshot};

#[test]
fn test_parses_global_flags_and_subcommands() {
    let cli = Cli::try_parse_from([
        "pulse",
        "--verbose",
        "--preset",
        "testing",
        "simulate",
        "--scenario",
        "echo-exclusion",
    ])
    .unwrap();

    assert!(cli.verbose);
    assert_eq!(cli.preset.as_deref(), Some("testing"));
    assert!(matches!(
        cli.command,
        Commands::Simulate {
            scenario: Some(Scenario::EchoExclusion)
        }
    ));

    let cli = Cli::try_parse_from(["pulse", "recompute", "snapshot.json", "--skip-xp-sync"])
        .unwrap();
    match cli.command {
        Commands::Recompute {
            input,
            skip_xp_sync,
        } => {
            assert_eq!(input.to_str(), Some("snapshot.json"));
            assert!(skip_xp_sync);
        }
        _ => panic!("expected recompute"),
    }
}

#[test]
fn test_rejects_unknown_scenarios() {
    assert!(Cli::try_parse_from(["pulse", "simulate", "--scenario", "nope"]).is_err());
}

#[test]
fn test_scenario_names_match_their_flags() {
    for scenario in Scenario::ALL {
        let cli =
            Cli::try_parse_from(["pulse", "simulate", "--scenario", scenario.name()]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Simulate { scenario: Some(parsed) } if parsed == scenario
        ));
    }
}

#[test]
fn test_preset_config_drives_the_recompute() {
    let mut config = AppConfig::from_toml_str("[pulse.progress]\npost_xp_delta = 1\n").unwrap();
    assert_eq!(config.pulse.progress.post_xp_delta, 1);

    let snapshot = Snapshot::from_json(r#"{"users":[{"user_id":9,"posts":3}]}"#).unwrap();
    let outcome = recompute::recompute(&snapshot, &config.pulse.progress, true).unwrap();
    // 3 posts at 1 XP each, then the first-post reward
    assert_eq!(outcome.users[0].progress.xp, 13);

    config.apply_preset("default").unwrap();
    let outcome = recompute::recompute(&snapshot, &config.pulse.progress, true).unwrap();
    assert_eq!(outcome.users[0].progress.xp, 40);
}
