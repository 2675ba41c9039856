//! sgsync - security-group allowlist synchronizer.

use anyhow::Result;
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use sgsync::cli::{Cli, Commands};
use sgsync::{commands, exit};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", err);
        std::process::exit(exit::codes::CONFIG);
    }

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            exit::codes::CONFIG
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Sync { dry_run } => commands::sync::run(dry_run, &cli.config).await,
        Commands::Feed => commands::feed::run(&cli.config).await,
        Commands::Rules => commands::rules::run(&cli.config).await,
        Commands::Version => {
            println!("sgsync {}", env!("CARGO_PKG_VERSION"));
            Ok(exit::codes::SUCCESS)
        }
    }
}
