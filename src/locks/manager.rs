//! Lock manager: hands out [`FileLock`]s and tracks what this process holds.

use super::handle::FileLock;
use super::listener::FileLockListener;
use super::metadata::ProcessMetaDataProvider;
use super::types::{ContendedAction, LockMode};
use crate::config::Config;
use crate::error::{CacheLockError, Result};
use crate::fs::canonicalize_target;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default time to wait for a lock held by another owner.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Canonical paths currently locked through one manager.
#[derive(Debug, Default)]
pub(super) struct LockRegistry {
    paths: Mutex<HashSet<PathBuf>>,
}

impl LockRegistry {
    /// Returns `false` if the path is already registered.
    pub(super) fn register(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf())
    }

    pub(super) fn deregister(&self, path: &Path) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    pub(super) fn contains(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// State shared between a manager and the locks it created.
pub(super) struct LockContext {
    pub(super) locked_files: LockRegistry,
    pub(super) metadata: Arc<dyn ProcessMetaDataProvider>,
    pub(super) listener: Arc<dyn FileLockListener>,
    pub(super) lock_timeout: Duration,
}

/// Creates locks on target files and directories.
///
/// A manager refuses to lock the same canonical path twice while the first
/// lock is open. Use one manager per process.
#[derive(Clone)]
pub struct FileLockManager {
    context: Arc<LockContext>,
}

impl FileLockManager {
    /// Create a manager with the default 60 second timeout.
    pub fn new(
        metadata: Arc<dyn ProcessMetaDataProvider>,
        listener: Arc<dyn FileLockListener>,
    ) -> Self {
        Self::with_timeout(metadata, listener, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(
        metadata: Arc<dyn ProcessMetaDataProvider>,
        listener: Arc<dyn FileLockListener>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            context: Arc::new(LockContext {
                locked_files: LockRegistry::default(),
                metadata,
                listener,
                lock_timeout,
            }),
        }
    }

    /// Create a manager using the timeout from `config`.
    pub fn from_config(
        config: &Config,
        metadata: Arc<dyn ProcessMetaDataProvider>,
        listener: Arc<dyn FileLockListener>,
    ) -> Self {
        Self::with_timeout(metadata, listener, config.lock_timeout())
    }

    pub fn lock_timeout(&self) -> Duration {
        self.context.lock_timeout
    }

    /// Whether this manager currently holds a lock on `target`.
    pub fn is_locked(&self, target: &Path) -> Result<bool> {
        let canonical = canonicalize_target(target)?;
        Ok(self.context.locked_files.contains(&canonical))
    }

    /// Lock `target` in `mode`.
    ///
    /// Blocks for up to the manager's timeout while another owner holds a
    /// conflicting lock, pinging that owner when it advertised a port.
    /// `when_contended` runs (on the listener's thread) whenever another
    /// process pings for this lock while it is held.
    ///
    /// # Errors
    ///
    /// * `UnsupportedLockMode` - `mode` is [`LockMode::None`]
    /// * `AlreadyLockedByProcess` - this manager already holds `target`
    /// * `LockTimeout` - another owner kept the lock past the deadline
    /// * `CorruptLockFile` - the lock file has an unknown protocol version
    pub fn lock(
        &self,
        target: &Path,
        mode: LockMode,
        target_display_name: &str,
        operation_display_name: &str,
        when_contended: ContendedAction,
    ) -> Result<FileLock> {
        if mode == LockMode::None {
            return Err(CacheLockError::UnsupportedLockMode(mode));
        }
        let canonical_target = canonicalize_target(target)?;
        if !self.context.locked_files.register(&canonical_target) {
            return Err(CacheLockError::AlreadyLockedByProcess {
                display_name: target_display_name.to_string(),
            });
        }

        let result = self.context.listener.reserve_port().and_then(|port| {
            FileLock::open(
                Arc::clone(&self.context),
                canonical_target.clone(),
                mode,
                target_display_name,
                operation_display_name,
                port,
            )
        });
        match result {
            Ok(lock) => {
                self.context
                    .listener
                    .lock_created(&canonical_target, when_contended);
                Ok(lock)
            }
            Err(e) => {
                self.context.locked_files.deregister(&canonical_target);
                Err(e)
            }
        }
    }
}
