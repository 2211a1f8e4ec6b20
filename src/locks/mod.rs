//! Locking subsystem for cachelock.
//!
//! Each target file or directory is guarded by a companion lock file:
//! `<name>.lock` next to a file target, or inside a directory target.
//!
//! # Lock Files
//!
//! Lock files are never deleted. They hold two regions, each protected by
//! its own OS byte-range lock:
//! - State region: protocol version and a clean/dirty flag
//! - Information region: contact port, owner pid and operation of the last
//!   exclusive holder
//!
//! The state region lock is the lock itself and is held for the life of a
//! [`FileLock`]. The information region lock is only held while reading or
//! rewriting the owner details.
//!
//! # Crash Detection
//!
//! Guarded writes mark the state region dirty before running and clean after
//! succeeding. A holder that dies in between leaves the dirty flag behind,
//! and the next holder sees [`FileLock::is_integrity_violated`].
//!
//! # Contention
//!
//! A waiter polls every 200 ms. Between attempts it reads the owner's port
//! from the information region and sends it a UDP ping through
//! [`FileLockCommunicator`], so a [`FileLockListener`] in the owning process
//! can release the lock early.

mod access;
mod codec;
mod communicator;
mod handle;
mod listener;
mod manager;
mod metadata;
mod operations;
mod region;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use access::lock_file_path;
pub use codec::{
    CodecError, INFORMATION_REGION_DESCR_CHUNK_LIMIT, INFORMATION_REGION_POS,
    INFORMATION_REGION_SIZE, STATE_REGION_SIZE, decode_information, decode_state,
    trim_if_necessary,
};
pub use communicator::FileLockCommunicator;
pub use handle::{FileLock, STATE_REGION_RETRY_INTERVAL};
pub use listener::{DefaultFileLockListener, FileLockListener, NoOpFileLockListener};
pub use manager::{DEFAULT_LOCK_TIMEOUT, FileLockManager};
pub use metadata::{DefaultProcessMetaDataProvider, ProcessMetaDataProvider};
pub use operations::{LockStatus, inspect_lock};
pub use types::{ContendedAction, LockMode, OwnerInfo};
