//! Read-only inspection of lock files.

use super::access::{LockFileAccess, lock_file_path};
use super::region;
use super::types::{LockMode, OwnerInfo};
use crate::error::Result;
use crate::fs::canonicalize_target;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Snapshot of a lock file as seen from outside the lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    /// The lock file path.
    pub lock_file: PathBuf,

    /// Whether the lock file exists.
    pub exists: bool,

    /// Clean flag of the state region, if the lock file has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,

    /// Most recent exclusive owner, if its details are still published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerInfo>,

    /// Mode the lock is currently held in by someone, if held.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held: Option<LockMode>,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.exists {
            return write!(f, "{} (not created)", self.lock_file.display());
        }
        write!(
            f,
            "{} ({}, {}",
            self.lock_file.display(),
            match self.held {
                Some(mode) => mode.as_str(),
                None => "free",
            },
            match self.clean {
                Some(true) => "clean",
                Some(false) => "not unlocked cleanly",
                None => "empty",
            }
        )?;
        if let Some(owner) = &self.owner {
            write!(f, ", owner: {}, operation: {}", owner.pid, owner.operation)?;
        }
        write!(f, ")")
    }
}

/// Inspect the lock file guarding `target` without taking the lock.
///
/// The holder mode is found by probing: an exclusive attempt that succeeds
/// means nobody holds the lock, a shared attempt that succeeds means shared
/// holders only. Probe locks are released immediately.
///
/// Only available on Linux. Elsewhere region locks belong to the process and
/// this fails with an `Unsupported` I/O error before opening the lock file.
pub fn inspect_lock(target: &Path) -> Result<LockStatus> {
    if !region::PER_DESCRIPTOR_LOCKS {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "lock inspection needs per-descriptor region locks on this platform",
        )
        .into());
    }
    let canonical = canonicalize_target(target)?;
    let lock_file = lock_file_path(&canonical)?;

    if !lock_file.exists() {
        return Ok(LockStatus {
            lock_file,
            exists: false,
            clean: None,
            owner: None,
            held: None,
        });
    }

    let access = LockFileAccess::open_existing(&lock_file)?;
    let held = probe_holder(&access)?;
    let clean = access.read_state_region()?.map(|state| state.clean);
    let owner = access.read_information_region()?;

    Ok(LockStatus {
        lock_file,
        exists: true,
        clean,
        owner,
        held,
    })
}

fn probe_holder(access: &LockFileAccess) -> Result<Option<LockMode>> {
    if access.try_lock_state_region(LockMode::Exclusive)?.is_some() {
        access.unlock_state_region()?;
        return Ok(None);
    }
    if access.try_lock_state_region(LockMode::Shared)?.is_some() {
        access.unlock_state_region()?;
        return Ok(Some(LockMode::Shared));
    }
    Ok(Some(LockMode::Exclusive))
}
