//! Configuration loading and validation.
//!
//! The configuration is read once at process start and treated as immutable
//! for the run. Secrets never live in the file: they are pulled from
//! environment variables into memory that is zeroed on drop.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::quota::DEFAULT_RULE_CEILING;
use crate::summary::RunContext;

/// Secret value that zeroizes its memory on drop.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub firewall: FirewallConfig,
    pub notify: NotifyConfig,
    pub context: ContextConfig,
    /// Compute and report the plan without mutating the firewall.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    /// Service (product) name to select from the feed.
    pub service: String,
    /// Traffic direction to select from the feed.
    pub direction: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://ip-ranges.atlassian.com/".to_string(),
            service: "bitbucket".to_string(),
            direction: "egress".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Security group id (env override: AWS_SG_ID).
    pub group_id: String,
    /// AWS region (env override: AWS_REGION).
    pub region: String,
    /// Managed tcp port.
    pub port: u16,
    /// Description attached to every managed rule. Rules without it are
    /// never read or touched.
    pub description: String,
    /// Maximum rule count the group may hold after an update.
    pub rule_ceiling: usize,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            group_id: String::new(),
            region: String::new(),
            port: 443,
            description: "Allowlisted by sgsync".to_string(),
            rule_ceiling: DEFAULT_RULE_CEILING,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    pub slack: SlackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub channel: String,
    /// Environment variable holding the bot token.
    pub token_env: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: "#devops-jenkins".to_string(),
            token_env: "SGSYNC_SLACK_TOKEN".to_string(),
        }
    }
}

impl SlackConfig {
    /// Read the bot token from the configured environment variable.
    pub fn token(&self) -> Option<SecureString> {
        env::var(&self.token_env)
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecureString::new)
    }
}

/// Scheduler metadata rendered verbatim into the outcome summary.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContextConfig {
    pub job_name: Option<String>,
    pub job_url: Option<String>,
}

impl ContextConfig {
    /// Resolve the run context, falling back to the scheduler's environment
    /// (JOB_NAME, JOB_URL) when the file leaves a field unset.
    pub fn resolve(&self) -> RunContext {
        RunContext {
            job_name: self
                .job_name
                .clone()
                .or_else(|| env::var("JOB_NAME").ok().filter(|v| !v.is_empty())),
            job_url: self
                .job_url
                .clone()
                .or_else(|| env::var("JOB_URL").ok().filter(|v| !v.is_empty())),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(group_id) = env::var("AWS_SG_ID") {
            if !group_id.is_empty() {
                self.firewall.group_id = group_id;
            }
        }
        if let Ok(region) = env::var("AWS_REGION") {
            if !region.is_empty() {
                self.firewall.region = region;
            }
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !self.feed.url.starts_with("https://") {
            anyhow::bail!("Feed URL must use HTTPS: {}", self.feed.url);
        }
        if self.feed.service.is_empty() {
            anyhow::bail!("feed.service must not be empty");
        }
        if self.feed.direction.is_empty() {
            anyhow::bail!("feed.direction must not be empty");
        }
        if self.firewall.group_id.is_empty() {
            anyhow::bail!("firewall.group_id is required (or set AWS_SG_ID)");
        }
        if !self.firewall.group_id.starts_with("sg-") {
            anyhow::bail!(
                "firewall.group_id must be a security group id: {}",
                self.firewall.group_id
            );
        }
        if self.firewall.region.is_empty() {
            anyhow::bail!("firewall.region is required (or set AWS_REGION)");
        }
        if self.firewall.port == 0 {
            anyhow::bail!("firewall.port must be non-zero");
        }
        if self.firewall.rule_ceiling == 0 {
            anyhow::bail!("firewall.rule_ceiling must be at least 1");
        }
        if self.firewall.description.is_empty() {
            anyhow::bail!("firewall.description must not be empty");
        }
        if self.notify.slack.enabled && self.notify.slack.channel.is_empty() {
            anyhow::bail!("notify.slack.channel is required when Slack is enabled");
        }
        Ok(())
    }
}
