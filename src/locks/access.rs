//! Read/write access to the regions of an open lock file.

use super::codec::{
    self, INFORMATION_REGION_POS, INFORMATION_REGION_SIZE, STATE_REGION_POS, STATE_REGION_SIZE,
    StateRegion,
};
use super::region::{self, RegionGuard};
use super::types::{LockMode, OwnerInfo};
use crate::error::{CacheLockError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const INFORMATION_REGION_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Derive the lock file for a target.
///
/// A directory is locked through `<dir>/<dir-name>.lock`; a file through a
/// sibling `<file-name>.lock`.
pub fn lock_file_path(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| CacheLockError::InvalidTarget(target.to_path_buf()))?;
    let mut lock_name = name.to_os_string();
    lock_name.push(".lock");

    if target.is_dir() {
        Ok(target.join(lock_name))
    } else {
        let parent = target
            .parent()
            .ok_or_else(|| CacheLockError::InvalidTarget(target.to_path_buf()))?;
        Ok(parent.join(lock_name))
    }
}

/// An open lock file.
///
/// Dropping it closes the descriptor, which also releases every region lock
/// taken through it.
#[derive(Debug)]
pub struct LockFileAccess {
    file: File,
    path: PathBuf,
}

impl LockFileAccess {
    /// Open the lock file for read/write, creating it and its parent
    /// directory if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing lock file for read/write without creating anything.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn try_lock_state_region(&self, mode: LockMode) -> Result<Option<LockMode>> {
        Ok(region::try_lock(&self.file, mode, STATE_REGION_POS, STATE_REGION_SIZE)?)
    }

    pub fn unlock_state_region(&self) -> Result<()> {
        Ok(region::unlock(&self.file, STATE_REGION_POS, STATE_REGION_SIZE)?)
    }

    pub fn try_lock_information_region(&self, mode: LockMode) -> Result<Option<RegionGuard<'_>>> {
        Ok(region::try_lock_guarded(
            &self.file,
            mode,
            INFORMATION_REGION_POS,
            INFORMATION_REGION_SIZE,
        )?)
    }

    /// Retry the information-region lock until `deadline`.
    ///
    /// Holders only keep the region for a single read or write. At least one
    /// attempt is made even if the deadline has already passed.
    pub fn lock_information_region(
        &self,
        mode: LockMode,
        deadline: Instant,
    ) -> Result<Option<RegionGuard<'_>>> {
        loop {
            if let Some(guard) = self.try_lock_information_region(mode)? {
                return Ok(Some(guard));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(INFORMATION_REGION_RETRY_INTERVAL);
        }
    }

    /// Decode the state region. `None` if the file is empty.
    pub fn read_state_region(&self) -> Result<Option<StateRegion>> {
        let mut buf = Vec::with_capacity(STATE_REGION_SIZE as usize);
        let mut file = &self.file;
        file.seek(SeekFrom::Start(STATE_REGION_POS))?;
        file.take(STATE_REGION_SIZE).read_to_end(&mut buf)?;
        codec::decode_state(&buf).map_err(|reason| self.corrupt(reason))
    }

    /// Overwrite the state region and flush it to disk.
    pub fn write_state_region(&self, clean: bool) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(STATE_REGION_POS))?;
        file.write_all(&codec::encode_state(clean))?;
        file.sync_data()?;
        Ok(())
    }

    /// Read the owner published in the information region.
    ///
    /// Takes a shared lock on the region for the duration of the read and
    /// gives up (returning `None`) if a writer holds it. Also `None` when the
    /// file is too short to contain a record.
    pub fn read_information_region(&self) -> Result<Option<OwnerInfo>> {
        let Some(_guard) = self.try_lock_information_region(LockMode::Shared)? else {
            tracing::debug!(lock_file = %self.path.display(), "could not lock information region, ignoring");
            return Ok(None);
        };
        if self.file_len()? <= INFORMATION_REGION_POS {
            tracing::debug!(lock_file = %self.path.display(), "lock file too short to contain information region, ignoring");
            return Ok(None);
        }

        let mut buf = Vec::new();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(INFORMATION_REGION_POS))?;
        file.take(INFORMATION_REGION_SIZE).read_to_end(&mut buf)?;
        let info = codec::decode_information(&buf).map_err(|reason| self.corrupt(reason))?;
        tracing::debug!(
            port = ?info.port,
            owner = %info.pid,
            operation = %info.operation,
            "read owner from information region"
        );
        Ok(Some(info))
    }

    /// Overwrite the information region and truncate the file to the end of
    /// the record. The caller must hold the exclusive information-region
    /// lock.
    pub fn write_information_region(&self, info: &OwnerInfo) -> Result<()> {
        let record = codec::encode_information(info).map_err(|reason| self.corrupt(reason))?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(INFORMATION_REGION_POS))?;
        file.write_all(&record)?;
        file.set_len(INFORMATION_REGION_POS + record.len() as u64)?;
        Ok(())
    }

    /// Truncate the file to the end of the state region. The caller must hold
    /// the exclusive information-region lock.
    pub fn discard_information_region(&self) -> Result<()> {
        self.file.set_len(INFORMATION_REGION_POS)?;
        Ok(())
    }

    fn corrupt(&self, reason: codec::CodecError) -> CacheLockError {
        CacheLockError::CorruptLockFile {
            lock_file: self.path.clone(),
            reason,
        }
    }
}
