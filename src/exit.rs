//! Exit codes for the sgsync CLI.
//!
//! All success outcomes (applied, no-changes, dry-run) exit 0 and are
//! distinguished by the printed status field; failures get distinct codes so
//! a scheduler can tell a quota block from a partial mutation without
//! parsing output.

use crate::summary::{FailureKind, RunStatus};

/// Exit code constants.
pub mod codes {
    /// Successful run (any of applied / no-changes / dry-run).
    pub const SUCCESS: i32 = 0;
    /// Invalid configuration or setup failure.
    pub const CONFIG: i32 = 2;
    /// Feed unreachable or undecodable.
    pub const FETCH: i32 = 3;
    /// Malformed feed entry.
    pub const PARSE: i32 = 4;
    /// Firewall state could not be read.
    pub const STORE_READ: i32 = 5;
    /// Plan would exceed the rule ceiling.
    pub const QUOTA: i32 = 6;
    /// Some mutations landed before a failure.
    pub const PARTIAL_APPLY: i32 = 7;
    /// Another instance holds the run lock.
    pub const LOCKED: i32 = 8;
}

/// Map a run status to an exit code.
pub fn status_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Applied | RunStatus::NoChanges | RunStatus::DryRun => codes::SUCCESS,
        RunStatus::Failed(kind) => match kind {
            FailureKind::Fetch => codes::FETCH,
            FailureKind::Parse => codes::PARSE,
            FailureKind::StoreRead => codes::STORE_READ,
            FailureKind::Quota => codes::QUOTA,
            FailureKind::PartialApply => codes::PARTIAL_APPLY,
        },
    }
}
