//! Run lock keyed by firewall target.
//!
//! The reconciler assumes at most one concurrent run per firewall target.
//! The scheduler is expected to serialize invocations; an advisory flock on
//! a per-group lock file catches overlapping runs on the same host anyway.
//! Runs against different groups may overlap freely.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const LOCK_DIR: &str = "/var/run";

/// A guard holding the exclusive run lock for one security group.
/// The lock is released when the guard is dropped.
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Attempt to acquire the run lock for `group_id`.
    /// Returns an error if another run against the same group holds it.
    pub fn acquire(group_id: &str) -> Result<Self> {
        Self::acquire_in(Path::new(LOCK_DIR), group_id)
    }

    /// Opens with create+read+write (no truncate) so there is no window
    /// between file creation and lock acquisition.
    fn acquire_in(dir: &Path, group_id: &str) -> Result<Self> {
        fs::create_dir_all(dir).ok();
        let path = lock_path(dir, group_id);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another sgsync run against {} is already in progress.\n\
                 Wait for it to complete, or remove the lock file if it is stale: {}",
                group_id,
                path.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}

fn lock_path(dir: &Path, group_id: &str) -> PathBuf {
    dir.join(format!("sgsync-{}.lock", group_id))
}
