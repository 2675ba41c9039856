//! The reconciliation run: fetch, diff, guard, apply, report.
//!
//! A run is a chain of result-returning stages, each short-circuiting on
//! failure so every exit path is explicit. No state survives between runs;
//! the firewall itself is the state. There are no internal retries: every
//! mutation is idempotent at the store boundary, so the external scheduler
//! re-invoking the whole pipeline is the retry mechanism.

use chrono::Utc;
use ipnet::Ipv4Net;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::canon::{self, CollapseStats, ParseError};
use crate::diff::{self, UpdatePlan};
use crate::feed::{FeedSource, FetchError};
use crate::firewall::{FirewallStore, RuleOp, StoreError};
use crate::notify::Notifier;
use crate::quota::{self, QuotaExceeded};
use crate::summary::{FailureKind, OutcomeSummary, RunContext, RunStatus};

/// Immutable per-run settings, derived from the configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub service: String,
    pub direction: String,
    /// Target identifier, carried into the outcome summary.
    pub target: String,
    pub rule_ceiling: usize,
    pub dry_run: bool,
    pub context: RunContext,
}

/// A rule mutation that completed before an apply failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedOp {
    pub op: RuleOp,
    pub net: Ipv4Net,
}

impl std::fmt::Display for AppliedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.op, self.net)
    }
}

/// Apply stopped partway: some mutations landed, a later one failed.
///
/// The firewall is deliberately left in the mixed state rather than rolled
/// back; the next scheduled run converges it.
#[derive(Debug, Error)]
#[error("apply aborted after {} completed operations: {source}", completed.len())]
pub struct PartialApplyError {
    pub completed: Vec<AppliedOp>,
    #[source]
    pub source: StoreError,
}

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("feed fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("feed entry rejected: {0}")]
    Parse(#[from] ParseError),
    #[error("firewall read failed: {0}")]
    StoreRead(StoreError),
    #[error(transparent)]
    Quota(#[from] QuotaExceeded),
    #[error(transparent)]
    PartialApply(#[from] PartialApplyError),
}

impl RunError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RunError::Fetch(_) => FailureKind::Fetch,
            RunError::Parse(_) => FailureKind::Parse,
            RunError::StoreRead(_) => FailureKind::StoreRead,
            RunError::Quota(_) => FailureKind::Quota,
            RunError::PartialApply(_) => FailureKind::PartialApply,
        }
    }
}

/// Accumulates summary fields as the stages progress, so a failed run still
/// reports whatever it learned before dying.
#[derive(Debug, Default)]
struct Draft {
    feed_count: usize,
    canonical_count: usize,
    current_count: usize,
    added: Vec<Ipv4Net>,
    removed: Vec<Ipv4Net>,
    resulting_count: usize,
}

pub struct Reconciler<'a> {
    feed: &'a dyn FeedSource,
    store: &'a dyn FirewallStore,
    notifier: &'a dyn Notifier,
    settings: SyncSettings,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        feed: &'a dyn FeedSource,
        store: &'a dyn FirewallStore,
        notifier: &'a dyn Notifier,
        settings: SyncSettings,
    ) -> Self {
        Self {
            feed,
            store,
            notifier,
            settings,
        }
    }

    /// Run the full pipeline and report the outcome.
    ///
    /// Never returns an error: failures are folded into the summary. A
    /// notification delivery failure is logged and does not change the
    /// run's classification.
    pub async fn run(&self) -> OutcomeSummary {
        let mut draft = Draft::default();
        let (status, error) = match self.stages(&mut draft).await {
            Ok(status) => {
                info!("Run finished: {}", status.as_str());
                (status, None)
            }
            Err(err) => {
                error!("Run failed: {}", err);
                if let RunError::PartialApply(ref partial) = err {
                    for op in &partial.completed {
                        warn!("Completed before failure: {}", op);
                    }
                }
                (RunStatus::Failed(err.kind()), Some(err.to_string()))
            }
        };

        let summary = OutcomeSummary {
            status,
            target: self.settings.target.clone(),
            feed_count: draft.feed_count,
            canonical_count: draft.canonical_count,
            current_count: draft.current_count,
            added: draft.added,
            removed: draft.removed,
            resulting_count: draft.resulting_count,
            error,
            context: self.settings.context.clone(),
            finished_at: Utc::now(),
        };

        if let Err(err) = self.notifier.send(&summary).await {
            warn!("Notification delivery failed: {}", err);
        }

        summary
    }

    async fn stages(&self, draft: &mut Draft) -> Result<RunStatus, RunError> {
        // Fetching
        let raw = self
            .feed
            .fetch(&self.settings.service, &self.settings.direction)
            .await?;

        // Diffing
        let (desired, stats) = canon::canonicalize(&raw)?;
        draft.feed_count = stats.before;
        draft.canonical_count = stats.after;
        log_collapse(&stats);

        let current = self
            .store
            .read_rules()
            .await
            .map_err(RunError::StoreRead)?;
        draft.current_count = current.len();
        info!(
            "Current rules in {}: {}",
            self.settings.target,
            current.len()
        );

        let plan = diff::diff(&desired, &current);
        draft.added = plan.additions.clone();
        draft.removed = plan.removals.clone();
        draft.resulting_count = plan.resulting_count;

        if plan.is_empty() {
            info!("No changes required, rule set already matches the feed");
            return Ok(RunStatus::NoChanges);
        }
        info!(
            "Plan: +{} / -{} rules, {} resulting",
            plan.additions.len(),
            plan.removals.len(),
            plan.resulting_count
        );

        // Guarding
        quota::check(current.len(), &plan, self.settings.rule_ceiling)?;

        // DryRunSkip | Applying
        if self.settings.dry_run {
            info!("Dry-run: plan computed but not applied");
            return Ok(RunStatus::DryRun);
        }
        self.apply(&plan).await?;
        Ok(RunStatus::Applied)
    }

    /// Apply removals before additions, in plan order. Once mutation starts
    /// the loop runs to completion or reports exactly what landed.
    async fn apply(&self, plan: &UpdatePlan) -> Result<(), PartialApplyError> {
        let mut completed = Vec::with_capacity(plan.removals.len() + plan.additions.len());

        for net in &plan.removals {
            info!("Revoking {}", net);
            match self.store.revoke_rule(*net).await {
                Ok(()) => completed.push(AppliedOp {
                    op: RuleOp::Revoke,
                    net: *net,
                }),
                Err(source) => return Err(PartialApplyError { completed, source }),
            }
        }
        for net in &plan.additions {
            info!("Authorizing {}", net);
            match self.store.authorize_rule(*net).await {
                Ok(()) => completed.push(AppliedOp {
                    op: RuleOp::Authorize,
                    net: *net,
                }),
                Err(source) => return Err(PartialApplyError { completed, source }),
            }
        }
        Ok(())
    }
}

fn log_collapse(stats: &CollapseStats) {
    match stats.reduction_percent() {
        Some(percent) => info!(
            "Canonicalized feed: {} entries -> {} blocks ({:.1}% reduction)",
            stats.before, stats.after, percent
        ),
        None => info!(
            "Canonicalized feed: {} entries, nothing to collapse",
            stats.before
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::CanonicalSet;
    use crate::firewall::mock::MockFirewall;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticFeed {
        entries: Vec<String>,
    }

    impl StaticFeed {
        fn new(entries: &[&str]) -> Self {
            Self {
                entries: entries.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl FeedSource for StaticFeed {
        async fn fetch(&self, _service: &str, _direction: &str) -> Result<Vec<String>, FetchError> {
            Ok(self.entries.clone())
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl FeedSource for FailingFeed {
        async fn fetch(&self, _service: &str, _direction: &str) -> Result<Vec<String>, FetchError> {
            Err(FetchError::TooLarge { limit: 1 })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<RunStatus>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, summary: &OutcomeSummary) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(summary.status);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _summary: &OutcomeSummary) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected("channel_not_found".to_string()))
        }
    }

    fn settings(dry_run: bool, ceiling: usize) -> SyncSettings {
        SyncSettings {
            service: "bitbucket".to_string(),
            direction: "egress".to_string(),
            target: "sg-test".to_string(),
            rule_ceiling: ceiling,
            dry_run,
            context: RunContext::default(),
        }
    }

    fn rules(entries: &[&str]) -> CanonicalSet {
        entries.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_applies_computed_delta() {
        let feed = StaticFeed::new(&["1.2.3.0/25", "1.2.3.128/25", "9.9.9.9/32"]);
        let store = MockFirewall::with_rules(rules(&["203.0.113.0/24"]));
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Applied);
        assert_eq!(summary.feed_count, 3);
        assert_eq!(summary.canonical_count, 2);
        assert_eq!(summary.added, vec![net("1.2.3.0/24"), net("9.9.9.9/32")]);
        assert_eq!(summary.removed, vec![net("203.0.113.0/24")]);
        assert_eq!(
            *store.rules.lock().unwrap(),
            rules(&["1.2.3.0/24", "9.9.9.9/32"])
        );
        assert_eq!(*notifier.sent.lock().unwrap(), vec![RunStatus::Applied]);
    }

    #[tokio::test]
    async fn test_removals_applied_before_additions() {
        let feed = StaticFeed::new(&["10.0.0.0/8"]);
        let store = MockFirewall::with_rules(rules(&["192.0.2.0/24"]));
        let notifier = RecordingNotifier::default();

        Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        let mutations = store.mutations.lock().unwrap();
        assert_eq!(
            *mutations,
            vec![
                (RuleOp::Revoke, net("192.0.2.0/24")),
                (RuleOp::Authorize, net("10.0.0.0/8")),
            ]
        );
    }

    #[tokio::test]
    async fn test_matching_sets_report_no_changes() {
        let feed = StaticFeed::new(&["104.192.140.0/22"]);
        let store = MockFirewall::with_rules(rules(&["104.192.140.0/22"]));
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::NoChanges);
        assert!(store.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let feed = StaticFeed::new(&["1.2.3.0/25", "1.2.3.128/25"]);
        let store = MockFirewall::with_rules(CanonicalSet::new());
        let notifier = RecordingNotifier::default();

        let first = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;
        assert_eq!(first.status, RunStatus::Applied);

        let second = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;
        assert_eq!(second.status, RunStatus::NoChanges);
        assert_eq!(store.mutations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates() {
        let feed = StaticFeed::new(&["10.0.0.0/8"]);
        let store = MockFirewall::with_rules(rules(&["192.0.2.0/24"]));
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(true, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::DryRun);
        assert!(store.mutations.lock().unwrap().is_empty());
        assert_eq!(*store.rules.lock().unwrap(), rules(&["192.0.2.0/24"]));
        // The computed (not applied) delta is still reported.
        assert_eq!(summary.added, vec![net("10.0.0.0/8")]);
        assert_eq!(summary.removed, vec![net("192.0.2.0/24")]);
    }

    #[tokio::test]
    async fn test_quota_exceeded_aborts_before_mutation() {
        // 59 current rules, plan adds 2 and removes none: 61 > 60.
        let current: Vec<String> = (0..59).map(|i| format!("10.0.{}.0/24", i)).collect();
        let mut desired = current.clone();
        desired.push("192.0.2.0/24".to_string());
        desired.push("198.51.100.0/24".to_string());

        let feed = StaticFeed { entries: desired };
        let store = MockFirewall::with_rules(current.iter().map(|s| s.parse().unwrap()).collect());
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Failed(FailureKind::Quota));
        assert!(summary.error.as_deref().unwrap().contains("61"));
        assert!(store.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_diff() {
        let store = MockFirewall::with_rules(rules(&["192.0.2.0/24"]));
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&FailingFeed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Failed(FailureKind::Fetch));
        assert!(store.mutations.lock().unwrap().is_empty());
        assert_eq!(summary.current_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_entry_aborts_run() {
        let feed = StaticFeed::new(&["1.2.3.0/24", "bogus"]);
        let store = MockFirewall::with_rules(CanonicalSet::new());
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Failed(FailureKind::Parse));
        assert!(summary.error.as_deref().unwrap().contains("bogus"));
        assert!(store.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_apply_reports_completed_ops() {
        let feed = StaticFeed::new(&["10.0.0.0/8", "172.16.0.0/12"]);
        let mut store = MockFirewall::with_rules(rules(&["192.0.2.0/24"]));
        store.fail_on = Some(net("172.16.0.0/12"));
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Failed(FailureKind::PartialApply));
        let detail = summary.error.as_deref().unwrap();
        assert!(detail.contains("2 completed"), "got: {}", detail);
        // The removal and the first addition landed; the firewall stays mixed.
        assert_eq!(
            *store.mutations.lock().unwrap(),
            vec![
                (RuleOp::Revoke, net("192.0.2.0/24")),
                (RuleOp::Authorize, net("10.0.0.0/8")),
            ]
        );
        assert_eq!(*store.rules.lock().unwrap(), rules(&["10.0.0.0/8"]));
    }

    #[tokio::test]
    async fn test_notify_failure_does_not_change_classification() {
        let feed = StaticFeed::new(&["10.0.0.0/8"]);
        let store = MockFirewall::with_rules(CanonicalSet::new());

        let summary = Reconciler::new(&feed, &store, &FailingNotifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Applied);
        assert!(summary.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_feed_removes_managed_rules() {
        let feed = StaticFeed::new(&[]);
        let store = MockFirewall::with_rules(rules(&["192.0.2.0/24"]));
        let notifier = RecordingNotifier::default();

        let summary = Reconciler::new(&feed, &store, &notifier, settings(false, 60))
            .run()
            .await;

        assert_eq!(summary.status, RunStatus::Applied);
        assert!(store.rules.lock().unwrap().is_empty());
    }
}
