//! Cachelock: crash-safe cross-process locking for persistent cache files.
//!
//! A target file or directory is locked through a companion `<name>.lock`
//! file. The lock file records whether the last writer finished cleanly and
//! who currently holds the lock, so a process that finds a half-written
//! cache can refuse to trust it and a process that is kept waiting can ask
//! the holder to let go.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{CacheLockError, Result};
pub use locks::{
    DefaultFileLockListener, DefaultProcessMetaDataProvider, FileLock, FileLockListener,
    FileLockManager, LockMode, NoOpFileLockListener, ProcessMetaDataProvider,
};
