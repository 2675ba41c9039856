//! Rule-count ceiling enforcement.

use crate::diff::UpdatePlan;
use thiserror::Error;

/// Default rule ceiling for a security group.
pub const DEFAULT_RULE_CEILING: usize = 60;

/// The plan would leave more rules in the group than the ceiling allows.
///
/// Raised before any mutation; recoverable by shrinking the feed or raising
/// the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "plan would leave {resulting_count} rules in the group, exceeding the ceiling of {ceiling}"
)]
pub struct QuotaExceeded {
    pub resulting_count: usize,
    pub ceiling: usize,
}

/// Check an update plan against the rule ceiling.
///
/// Fails when `current_count − removals + additions > ceiling`. Landing
/// exactly on the ceiling passes. This is a hard precondition for applying,
/// not a warning.
pub fn check(current_count: usize, plan: &UpdatePlan, ceiling: usize) -> Result<(), QuotaExceeded> {
    // Removals are always a subset of the current rules; saturate anyway.
    let resulting_count = current_count.saturating_sub(plan.removals.len()) + plan.additions.len();
    if resulting_count > ceiling {
        Err(QuotaExceeded {
            resulting_count,
            ceiling,
        })
    } else {
        Ok(())
    }
}
