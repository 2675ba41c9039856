//! Outcome delivery to Slack.
//!
//! Delivery failures are non-fatal: the reconciler logs them and never lets
//! them change the run's success or failure classification.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{SecureString, SlackConfig};
use crate::summary::OutcomeSummary;

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";
const TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("slack bot token is not set (env {0})")]
    MissingToken(String),
    #[error("slack request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("slack rejected the message: {0}")]
    Rejected(String),
}

/// Receives the outcome summary of a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, summary: &OutcomeSummary) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: String,
    mrkdwn: bool,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Notifier posting to a Slack channel via `chat.postMessage`.
pub struct SlackNotifier {
    client: Client,
    channel: String,
    token: SecureString,
}

impl SlackNotifier {
    pub fn from_config(config: &SlackConfig) -> Result<Self, NotifyError> {
        let token = config
            .token()
            .ok_or_else(|| NotifyError::MissingToken(config.token_env.clone()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("sgsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(NotifyError::Client)?;
        Ok(Self {
            client,
            channel: config.channel.clone(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, summary: &OutcomeSummary) -> Result<(), NotifyError> {
        let payload = PostMessage {
            channel: &self.channel,
            text: summary.render_slack(),
            mrkdwn: true,
        };

        let response = self
            .client
            .post(SLACK_POST_MESSAGE_URL)
            .bearer_auth(self.token.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(NotifyError::Request)?;

        let body: SlackResponse = response.json().await.map_err(NotifyError::Request)?;
        if !body.ok {
            return Err(NotifyError::Rejected(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        debug!("Slack notification delivered to {}", self.channel);
        Ok(())
    }
}

/// No-op notifier used when notifications are disabled.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _summary: &OutcomeSummary) -> Result<(), NotifyError> {
        Ok(())
    }
}
