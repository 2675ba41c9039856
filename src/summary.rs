//! Outcome summary produced at the end of every run.
//!
//! Built once per run, handed to the notifier, then discarded. The summary
//! carries enough detail for a human to see which stage the run reached and
//! what changed (or would have changed, under dry-run).

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;

/// Which stage a failed run died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Parse,
    StoreRead,
    Quota,
    PartialApply,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Parse => "parse",
            FailureKind::StoreRead => "store-read",
            FailureKind::Quota => "quota-exceeded",
            FailureKind::PartialApply => "partial-apply",
        }
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The computed delta was applied to the firewall.
    Applied,
    /// Desired and current sets already match; nothing to do.
    NoChanges,
    /// A non-empty delta was computed but not applied.
    DryRun,
    Failed(FailureKind),
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Applied => "applied",
            RunStatus::NoChanges => "no-changes",
            RunStatus::DryRun => "dry-run",
            RunStatus::Failed(_) => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RunStatus::Failed(_))
    }
}

/// Scheduler metadata passed through verbatim for the notifier to render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub job_name: Option<String>,
    pub job_url: Option<String>,
}

/// Everything a run reports about itself.
#[derive(Debug, Clone)]
pub struct OutcomeSummary {
    pub status: RunStatus,
    /// The managed security group.
    pub target: String,
    /// Feed entry count before collapsing.
    pub feed_count: usize,
    /// Canonical block count after collapsing.
    pub canonical_count: usize,
    /// Rules in the group before this run.
    pub current_count: usize,
    pub added: Vec<Ipv4Net>,
    pub removed: Vec<Ipv4Net>,
    /// Rule count after the plan (computed even when not applied).
    pub resulting_count: usize,
    /// Human-readable failure detail, present iff status is `Failed`.
    pub error: Option<String>,
    pub context: RunContext,
    pub finished_at: DateTime<Utc>,
}

impl OutcomeSummary {
    /// Render the summary as plain text for stdout and logs.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("status: {}\n", self.status.as_str()));
        out.push_str(&format!("target: {}\n", self.target));
        out.push_str(&format!(
            "feed: {} entries -> {} canonical blocks\n",
            self.feed_count, self.canonical_count
        ));
        out.push_str(&format!(
            "rules: {} current, +{} / -{}, {} resulting\n",
            self.current_count,
            self.added.len(),
            self.removed.len(),
            self.resulting_count
        ));
        if let Some(ref error) = self.error {
            out.push_str(&format!("error: {}\n", error));
        }
        out
    }

    /// Render the summary as a Slack mrkdwn message.
    pub fn render_slack(&self) -> String {
        let headline = match self.status {
            RunStatus::Applied => format!(
                "✅ Updated security group with {} feed CIDR blocks (+{} / -{}).",
                self.canonical_count,
                self.added.len(),
                self.removed.len()
            ),
            RunStatus::NoChanges => format!(
                "✅ Security group already up to date ({} rules).",
                self.current_count
            ),
            RunStatus::DryRun => format!(
                "🟡 Dry-run: would add {} and remove {} rules ({} resulting).",
                self.added.len(),
                self.removed.len(),
                self.resulting_count
            ),
            RunStatus::Failed(kind) => format!(
                "🚨 Security group NOT updated ({}): {}",
                kind.as_str(),
                self.error.as_deref().unwrap_or("unknown error")
            ),
        };

        let mut lines = vec![headline, format!("*Security group:* `{}`", self.target)];
        if let Some(ref job_name) = self.context.job_name {
            lines.push(format!("*Job:* `{}`", job_name));
        }
        if let Some(ref job_url) = self.context.job_url {
            lines.push(format!("*Job URL:* `{}`", job_url));
        }
        lines.join("\n")
    }
}
