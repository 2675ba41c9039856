//! Set difference between the desired and current rule sets.

use crate::canon::CanonicalSet;
use ipnet::Ipv4Net;

/// The add/remove delta that turns the current rule set into the desired one.
///
/// Additions and removals are sorted by network address then prefix length,
/// so plans (and the logs and tests built on them) are reproducible.
/// A plan is immutable once computed and is discarded after apply or report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub additions: Vec<Ipv4Net>,
    pub removals: Vec<Ipv4Net>,
    /// Rule count after the plan is applied.
    pub resulting_count: usize,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Compute the update plan between two canonical sets.
///
/// `additions = desired − current`, `removals = current − desired`, by exact
/// canonical equality. Differently-shaped blocks covering the same addresses
/// (a /23 versus its two /24 halves) are distinct entries: one side is
/// removed and the other added. Both inputs must already be canonical; no
/// re-collapse happens here.
pub fn diff(desired: &CanonicalSet, current: &CanonicalSet) -> UpdatePlan {
    let additions: Vec<Ipv4Net> = desired.difference(current).copied().collect();
    let removals: Vec<Ipv4Net> = current.difference(desired).copied().collect();
    let resulting_count = current.len() - removals.len() + additions.len();
    UpdatePlan {
        additions,
        removals,
        resulting_count,
    }
}
