//! Feed command: fetch and canonicalize without touching the firewall.

use anyhow::{Context, Result};
use std::path::Path;

use crate::canon;
use crate::config::Config;
use crate::exit;
use crate::feed::{FeedSource, HttpFeed};

pub async fn run(config_path: &Path) -> Result<i32> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let feed = HttpFeed::new(&config.feed.url)?;
    let raw = feed
        .fetch(&config.feed.service, &config.feed.direction)
        .await?;
    let (canonical, stats) = canon::canonicalize(&raw)?;

    println!(
        "{} {} {} ranges ({} entries before collapse):",
        canonical.len(),
        config.feed.service,
        config.feed.direction,
        stats.before
    );
    for net in &canonical {
        println!("  {}", net);
    }
    if let Some(percent) = stats.reduction_percent() {
        println!(
            "Collapse removed {} entries ({:.1}%)",
            stats.before - stats.after,
            percent
        );
    }

    Ok(exit::codes::SUCCESS)
}
