//! The lock handle: one held lock on one target.

use super::access::{LockFileAccess, lock_file_path};
use super::codec::{STATE_REGION_SIZE, trim_if_necessary};
use super::communicator::FileLockCommunicator;
use super::manager::LockContext;
use super::types::{LockMode, OwnerInfo};
use crate::error::{CacheLockError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Interval between attempts to lock the state region.
pub const STATE_REGION_RETRY_INTERVAL: Duration = Duration::from_millis(200);

const UNKNOWN_OWNER: &str = "unknown";

/// A lock on a target file or directory, backed by a `<name>.lock` file.
///
/// Created by [`FileLockManager::lock`](super::FileLockManager::lock). The lock
/// is held until [`close`](Self::close) is called or the handle is dropped.
/// Reads and writes of the target should go through [`read_file`](Self::read_file),
/// [`write_file`](Self::write_file) and [`update_file`](Self::update_file), which
/// keep the clean/dirty marker of the lock file in step with the target.
pub struct FileLock {
    target: PathBuf,
    lock_file: PathBuf,
    display_name: String,
    operation_display_name: String,
    mode: LockMode,
    port: Option<u16>,
    integrity_violated: bool,
    /// `None` once closed.
    access: Option<LockFileAccess>,
    context: Arc<LockContext>,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("target", &self.target)
            .field("lock_file", &self.lock_file)
            .field("mode", &self.mode)
            .field("integrity_violated", &self.integrity_violated)
            .field("open", &self.access.is_some())
            .finish()
    }
}

impl FileLock {
    /// Open the lock file and acquire the state region lock.
    ///
    /// `target` must already be canonical and registered with the manager.
    pub(super) fn open(
        context: Arc<LockContext>,
        target: PathBuf,
        mode: LockMode,
        display_name: &str,
        operation_display_name: &str,
        port: Option<u16>,
    ) -> Result<Self> {
        if mode == LockMode::None {
            return Err(CacheLockError::UnsupportedLockMode(mode));
        }
        let lock_file = lock_file_path(&target)?;

        let mut lock = Self {
            target,
            lock_file,
            display_name: display_name.to_string(),
            operation_display_name: operation_display_name.to_string(),
            mode,
            port,
            integrity_violated: true,
            access: None,
            context,
        };

        // On any error below `access` is dropped, which closes the descriptor
        // and with it every region lock taken so far.
        let access = LockFileAccess::open(&lock.lock_file)?;
        lock.mode = lock.acquire(&access, mode)?;
        lock.integrity_violated = !unlocked_cleanly(&access)?;
        lock.access = Some(access);
        Ok(lock)
    }

    /// The canonical target this lock protects.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the backing lock file.
    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Whether `file` is the lock file backing this lock.
    pub fn is_lock_file(&self, file: &Path) -> bool {
        file == self.lock_file
    }

    /// The mode granted by the OS.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.access.is_none()
    }

    /// Whether the previous holder left the target in an unknown state.
    ///
    /// Computed at acquisition; only a successful write under this lock
    /// clears it.
    pub fn is_integrity_violated(&self) -> bool {
        self.integrity_violated
    }

    /// Re-read the clean flag from the lock file.
    pub fn unlocked_cleanly(&self) -> Result<bool> {
        unlocked_cleanly(self.open_access()?)
    }

    /// Run a read of the target.
    ///
    /// Fails if the previous holder did not unlock cleanly.
    pub fn read_file<T>(&self, action: impl FnOnce() -> anyhow::Result<T>) -> Result<T> {
        self.assert_open_and_integral()?;
        Ok(action()?)
    }

    /// Run a write of the target that builds on its current contents.
    ///
    /// Like [`write_file`](Self::write_file), but refuses to run if the
    /// previous holder did not unlock cleanly.
    pub fn update_file<T>(&mut self, action: impl FnOnce() -> anyhow::Result<T>) -> Result<T> {
        self.assert_open_and_integral()?;
        self.do_write_action(action)
    }

    /// Run a write of the target that replaces its contents.
    ///
    /// The lock file is marked dirty before `action` runs and clean after it
    /// returns `Ok`. If `action` fails the dirty marker stays, so the next
    /// holder sees the target as not unlocked cleanly.
    pub fn write_file<T>(&mut self, action: impl FnOnce() -> anyhow::Result<T>) -> Result<T> {
        self.open_access()?;
        self.do_write_action(action)
    }

    /// Release the lock. Calling this again is a no-op.
    ///
    /// Failures are logged rather than returned: close runs on cleanup paths
    /// where a second error would hide the first.
    pub fn close(&mut self) {
        let Some(access) = self.access.take() else {
            return;
        };
        tracing::debug!(lock = %self.display_name, "releasing lock");
        self.context.locked_files.deregister(&self.target);

        if self.mode == LockMode::Exclusive
            && let Err(e) = self.discard_information_region(&access)
        {
            tracing::warn!(lock = %self.display_name, "error releasing lock: {}", e);
        }
        if let Err(e) = access.unlock_state_region() {
            tracing::warn!(lock = %self.display_name, "error releasing lock: {}", e);
        }
        drop(access);

        self.context.listener.lock_closed(&self.target);
    }

    fn do_write_action<T>(&mut self, action: impl FnOnce() -> anyhow::Result<T>) -> Result<T> {
        if self.mode != LockMode::Exclusive {
            return Err(CacheLockError::InsufficientLockMode);
        }
        let access = self.access.as_ref().ok_or(CacheLockError::LockClosed)?;

        self.integrity_violated = true;
        access.write_state_region(false)?;
        let value = action()?;
        access.write_state_region(true)?;
        self.integrity_violated = false;
        Ok(value)
    }

    fn open_access(&self) -> Result<&LockFileAccess> {
        self.access.as_ref().ok_or(CacheLockError::LockClosed)
    }

    fn assert_open_and_integral(&self) -> Result<()> {
        self.open_access()?;
        if self.integrity_violated {
            return Err(CacheLockError::FileIntegrityViolated {
                target: self.target.clone(),
            });
        }
        Ok(())
    }

    fn acquire(&self, access: &LockFileAccess, mode: LockMode) -> Result<LockMode> {
        tracing::debug!(mode = %mode, lock = %self.display_name, "waiting to acquire lock");
        let deadline = Instant::now() + self.context.lock_timeout;

        let Some(granted) = self.lock_state_region(access, mode, deadline)? else {
            let owner = self.read_owner_best_effort(access);
            return Err(CacheLockError::LockTimeout {
                display_name: self.display_name.clone(),
                owner_pid: owner
                    .as_ref()
                    .map_or_else(|| UNKNOWN_OWNER.to_string(), |o| o.pid.clone()),
                owner_operation: owner
                    .as_ref()
                    .map_or_else(|| UNKNOWN_OWNER.to_string(), |o| o.operation.clone()),
                our_pid: self.context.metadata.process_identifier(),
                our_operation: self.operation_display_name.clone(),
                lock_file: self.lock_file.clone(),
            });
        };

        access.read_state_region()?;

        if granted == LockMode::Exclusive {
            if access.file_len()? < STATE_REGION_SIZE {
                // Lock file did not exist before locking.
                access.write_state_region(false)?;
            }

            let guard = access
                .lock_information_region(LockMode::Exclusive, deadline)?
                .ok_or_else(|| CacheLockError::InformationRegionTimeout {
                    display_name: self.display_name.clone(),
                })?;
            let pid = self.context.metadata.process_identifier();
            access.write_information_region(&OwnerInfo {
                port: self.port,
                pid: trim_if_necessary(&pid).to_string(),
                operation: trim_if_necessary(&self.operation_display_name).to_string(),
            })?;
            drop(guard);
        }

        tracing::debug!(mode = %granted, lock = %self.display_name, "lock acquired");
        Ok(granted)
    }

    fn lock_state_region(
        &self,
        access: &LockFileAccess,
        mode: LockMode,
        deadline: Instant,
    ) -> Result<Option<LockMode>> {
        loop {
            if let Some(granted) = access.try_lock_state_region(mode)? {
                return Ok(Some(granted));
            }
            if self.port.is_some() {
                self.ping_owner(access);
            }
            thread::sleep(STATE_REGION_RETRY_INTERVAL);
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn ping_owner(&self, access: &LockFileAccess) {
        match self.read_owner_best_effort(access).and_then(|owner| owner.port) {
            Some(port) => {
                tracing::info!(
                    port,
                    "the file lock is held by a different process, will attempt to ping owner"
                );
                if let Err(e) = FileLockCommunicator::ping_owner(port, &self.target) {
                    tracing::warn!(port, "failed to ping lock owner: {}", e);
                }
            }
            None => {
                tracing::info!(
                    "the file lock is held by a different process, unable to read which port the owner listens on"
                );
            }
        }
    }

    fn read_owner_best_effort(&self, access: &LockFileAccess) -> Option<OwnerInfo> {
        access.read_information_region().unwrap_or_else(|e| {
            tracing::debug!(lock = %self.display_name, "could not read lock owner: {}", e);
            None
        })
    }

    /// Makes a single attempt on the information-region lock.
    fn discard_information_region(&self, access: &LockFileAccess) -> Result<()> {
        let _guard = access
            .try_lock_information_region(LockMode::Exclusive)?
            .ok_or_else(|| CacheLockError::InformationRegionTimeout {
                display_name: self.display_name.clone(),
            })?;
        access.discard_information_region()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.close();
    }
}

/// A lock file shorter than the state region counts as not unlocked cleanly.
fn unlocked_cleanly(access: &LockFileAccess) -> Result<bool> {
    Ok(access.read_state_region()?.is_some_and(|state| state.clean))
}
