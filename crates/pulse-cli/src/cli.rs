//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named fabric preset; replaces the `[pulse]` section of the file
    #[arg(short, long)]
    pub preset: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the channel/event contract
    Channels {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run example scenarios end-to-end against the in-memory broker
    Simulate {
        /// Run a single scenario
        #[arg(short, long, value_enum)]
        scenario: Option<Scenario>,
    },
    /// Retroactive progress recompute over a JSON activity snapshot
    Recompute {
        /// Snapshot file
        input: PathBuf,
        /// Only evaluate achievements and rank; leave XP as imported
        #[arg(long)]
        skip_xp_sync: bool,
    },
    /// Show the effective configuration
    Config {
        /// List the named presets instead
        #[arg(long)]
        presets: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Draft to published fires once; later edits fire nothing
    PublishOnce,
    /// The writer's own connection gets no echo
    EchoExclusion,
    /// 1st, 10th and 11th forum posts unlock the post milestones
    Milestones,
    /// Unlocking twice yields one row and one XP grant
    IdempotentUnlock,
    /// Rank follows reputation down after deletes
    RankFollowsReputation,
    /// Stock changes publish, description edits do not
    StockUpdate,
    /// Comments publish on approval, on the parent's channel
    CommentModeration,
    /// Pushes for hydrated ids do not grow the list
    HydrateDedup,
}

impl Scenario {
    pub const ALL: [Scenario; 8] = [
        Scenario::PublishOnce,
        Scenario::EchoExclusion,
        Scenario::Milestones,
        Scenario::IdempotentUnlock,
        Scenario::RankFollowsReputation,
        Scenario::StockUpdate,
        Scenario::CommentModeration,
        Scenario::HydrateDedup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::PublishOnce => "publish-once",
            Scenario::EchoExclusion => "echo-exclusion",
            Scenario::Milestones => "milestones",
            Scenario::IdempotentUnlock => "idempotent-unlock",
            Scenario::RankFollowsReputation => "rank-follows-reputation",
            Scenario::StockUpdate => "stock-update",
            Scenario::CommentModeration => "comment-moderation",
            Scenario::HydrateDedup => "hydrate-dedup",
        }
    }
}
