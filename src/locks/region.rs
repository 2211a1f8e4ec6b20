//! Advisory byte-range locks on an open lock file.
//!
//! On Linux these are open-file-description locks (`F_OFD_SETLK`): they
//! belong to the `File`, so two handles inside one process contend exactly
//! like two processes would, and closing one descriptor never drops the
//! locks of another. Other Unix targets fall back to classic POSIX record
//! locks (`F_SETLK`), which are owned by the process.

use super::types::LockMode;
use std::fs::File;
use std::io;

/// Whether region locks belong to the open file description rather than
/// the process. Only then can a second descriptor on a lock file be opened
/// and closed without releasing locks this process already holds.
pub const PER_DESCRIPTOR_LOCKS: bool = cfg!(target_os = "linux");

/// A region lock released on drop.
#[derive(Debug)]
pub struct RegionGuard<'a> {
    file: &'a File,
    start: u64,
    len: u64,
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = unlock(self.file, self.start, self.len) {
            tracing::debug!(start = self.start, len = self.len, "failed to release region lock: {}", e);
        }
    }
}

/// Try once to lock `[start, start + len)` without blocking.
///
/// Returns the mode actually granted, or `None` if another owner holds a
/// conflicting lock.
pub fn try_lock(file: &File, mode: LockMode, start: u64, len: u64) -> io::Result<Option<LockMode>> {
    if sys::set_lock(file, mode, start, len)? {
        Ok(Some(mode))
    } else {
        Ok(None)
    }
}

/// Like [`try_lock`], but hands back a guard that unlocks the range on drop.
pub fn try_lock_guarded(
    file: &File,
    mode: LockMode,
    start: u64,
    len: u64,
) -> io::Result<Option<RegionGuard<'_>>> {
    Ok(try_lock(file, mode, start, len)?.map(|_| RegionGuard { file, start, len }))
}

/// Release any lock this handle holds on `[start, start + len)`.
pub fn unlock(file: &File, start: u64, len: u64) -> io::Result<()> {
    sys::unlock(file, start, len)
}

#[cfg(unix)]
mod sys {
    use super::LockMode;
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    #[cfg(target_os = "linux")]
    const SET_LOCK: libc::c_int = libc::F_OFD_SETLK;
    #[cfg(not(target_os = "linux"))]
    const SET_LOCK: libc::c_int = libc::F_SETLK;

    pub fn set_lock(file: &File, mode: LockMode, start: u64, len: u64) -> io::Result<bool> {
        let lock_type = match mode {
            LockMode::Shared => libc::F_RDLCK,
            LockMode::Exclusive => libc::F_WRLCK,
            LockMode::None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot take a region lock in mode none",
                ));
            }
        };
        match fcntl(file, lock_type as libc::c_short, start, len) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EAGAIN) | Some(libc::EACCES)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn unlock(file: &File, start: u64, len: u64) -> io::Result<()> {
        fcntl(file, libc::F_UNLCK as libc::c_short, start, len)
    }

    fn fcntl(file: &File, lock_type: libc::c_short, start: u64, len: u64) -> io::Result<()> {
        let start = libc::off_t::try_from(start)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region start out of range"))?;
        let len = libc::off_t::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region length out of range"))?;

        // SAFETY: `flock` is plain old data; an all-zero value is valid and
        // leaves `l_pid` at 0 as required for open-file-description locks.
        let mut region: libc::flock = unsafe { std::mem::zeroed() };
        region.l_type = lock_type;
        region.l_whence = libc::SEEK_SET as libc::c_short;
        region.l_start = start;
        region.l_len = len;

        // SAFETY: the descriptor is owned by `file` and stays open for the
        // duration of the call; `region` outlives the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), SET_LOCK, &region as *const libc::flock) };
        if rc == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use super::LockMode;
    use std::fs::File;
    use std::io;

    pub fn set_lock(_file: &File, _mode: LockMode, _start: u64, _len: u64) -> io::Result<bool> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "region locks are only implemented for unix targets",
        ))
    }

    pub fn unlock(_file: &File, _start: u64, _len: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "region locks are only implemented for unix targets",
        ))
    }
}
