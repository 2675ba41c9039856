//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sgsync")]
#[command(author, version, about = "Security-group allowlist synchronizer")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "/etc/sgsync/config.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/CI schedulers)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the feed, diff against the security group, and apply the delta
    Sync {
        /// Compute and report the plan without mutating the security group
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch and canonicalize the feed, then print the resulting blocks
    Feed,

    /// Print the security-group rules currently managed by sgsync
    Rules,

    /// Show version
    Version,
}
