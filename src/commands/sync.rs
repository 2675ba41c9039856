//! Sync command: the full reconciliation run.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::error;

use crate::config::Config;
use crate::exit;
use crate::feed::HttpFeed;
use crate::firewall::Ec2SecurityGroup;
use crate::lock::LockGuard;
use crate::notify::{NoopNotifier, Notifier, SlackNotifier};
use crate::reconciler::{Reconciler, SyncSettings};

/// Run the sync command. Returns the process exit code.
pub async fn run(dry_run: bool, config_path: &Path) -> Result<i32> {
    let mut config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if dry_run {
        config.dry_run = true;
    }

    let _lock = match LockGuard::acquire(&config.firewall.group_id) {
        Ok(guard) => guard,
        Err(err) => {
            error!("{:#}", err);
            return Ok(exit::codes::LOCKED);
        }
    };

    let feed = HttpFeed::new(&config.feed.url)?;
    let store = Ec2SecurityGroup::connect(
        &config.firewall.region,
        &config.firewall.group_id,
        config.firewall.port,
        &config.firewall.description,
    )
    .await;
    let notifier: Box<dyn Notifier> = if config.notify.slack.enabled {
        Box::new(SlackNotifier::from_config(&config.notify.slack)?)
    } else {
        Box::new(NoopNotifier)
    };

    let settings = SyncSettings {
        service: config.feed.service.clone(),
        direction: config.feed.direction.clone(),
        target: config.firewall.group_id.clone(),
        rule_ceiling: config.firewall.rule_ceiling,
        dry_run: config.dry_run,
        context: config.context.resolve(),
    };

    let reconciler = Reconciler::new(&feed, &store, notifier.as_ref(), settings);
    let summary = reconciler.run().await;

    print!("{}", summary.render_text());
    Ok(exit::status_code(summary.status))
}
