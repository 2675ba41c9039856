//! Rules command: print the currently managed security-group rules.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::exit;
use crate::firewall::{Ec2SecurityGroup, FirewallStore};

pub async fn run(config_path: &Path) -> Result<i32> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let store = Ec2SecurityGroup::connect(
        &config.firewall.region,
        &config.firewall.group_id,
        config.firewall.port,
        &config.firewall.description,
    )
    .await;
    let rules = store.read_rules().await?;

    println!(
        "{} managed rules in {} (tcp/{}):",
        rules.len(),
        config.firewall.group_id,
        config.firewall.port
    );
    for net in &rules {
        println!("  {}", net);
    }

    Ok(exit::codes::SUCCESS)
}
