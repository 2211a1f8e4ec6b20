//! Error types for cachelock.
//!
//! Uses thiserror for derive macros. Every failure a caller may want to
//! react to differently (timeout vs. corruption vs. misuse) has its own
//! variant so it can be matched on rather than parsed from a message.

use crate::exit_codes;
use crate::locks::{CodecError, LockMode};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cachelock operations.
#[derive(Error, Debug)]
pub enum CacheLockError {
    /// The requested lock mode has no implementation.
    #[error("No {0} mode lock implementation available.")]
    UnsupportedLockMode(LockMode),

    /// This process already holds a lock on the same canonical path.
    #[error("Cannot lock {display_name} as it has already been locked by this process.")]
    AlreadyLockedByProcess { display_name: String },

    /// The state region could not be locked before the deadline.
    #[error(
        "Timeout waiting to lock {display_name}. It is currently in use by another process.\n\
         Owner PID: {owner_pid}\n\
         Our PID: {our_pid}\n\
         Owner Operation: {owner_operation}\n\
         Our operation: {our_operation}\n\
         Lock file: {}",
        .lock_file.display()
    )]
    LockTimeout {
        display_name: String,
        owner_pid: String,
        owner_operation: String,
        our_pid: String,
        our_operation: String,
        lock_file: PathBuf,
    },

    /// The information region stayed locked by someone else while we tried to
    /// publish or discard ownership details.
    #[error("Timeout waiting to lock the information region for lock {display_name}")]
    InformationRegionTimeout { display_name: String },

    /// A protocol byte in the lock file did not match the expected version.
    #[error("Unexpected lock protocol found in lock file '{}': {reason}", .lock_file.display())]
    CorruptLockFile {
        lock_file: PathBuf,
        #[source]
        reason: CodecError,
    },

    /// The previous holder left the dirty marker set.
    #[error("The file '{}' was not unlocked cleanly", .target.display())]
    FileIntegrityViolated { target: PathBuf },

    /// A write was requested while holding a shared lock.
    #[error("An exclusive lock is required for this operation")]
    InsufficientLockMode,

    /// The handle was used after `close()`.
    #[error("This lock has been closed.")]
    LockClosed,

    /// The target has no file name to derive a lock file from.
    #[error("Cannot derive a lock file for target '{}'", .0.display())]
    InvalidTarget(PathBuf),

    /// The contention communicator was used before `start()`.
    #[error("The communicator was not started.")]
    CommunicatorNotStarted,

    /// `start()` was called on a communicator that is already running.
    #[error("The communicator has already been started.")]
    CommunicatorAlreadyStarted,

    /// A contention ping could not be decoded.
    #[error("Received an invalid contention ping: {0}")]
    InvalidPing(#[source] CodecError),

    /// Invalid configuration.
    #[error("{0}")]
    Config(String),

    /// A global exclude pattern is not a valid glob.
    #[error("Invalid exclude pattern: {0}")]
    InvalidExcludePattern(#[from] globset::Error),

    /// Disk or socket failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A caller-supplied guarded action failed.
    #[error(transparent)]
    Action(#[from] anyhow::Error),
}

impl CacheLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CacheLockError::UnsupportedLockMode(_)
            | CacheLockError::AlreadyLockedByProcess { .. }
            | CacheLockError::InsufficientLockMode
            | CacheLockError::LockClosed
            | CacheLockError::InvalidTarget(_)
            | CacheLockError::CommunicatorNotStarted
            | CacheLockError::CommunicatorAlreadyStarted
            | CacheLockError::Config(_)
            | CacheLockError::InvalidExcludePattern(_)
            | CacheLockError::Action(_) => exit_codes::USER_ERROR,
            CacheLockError::CorruptLockFile { .. }
            | CacheLockError::FileIntegrityViolated { .. }
            | CacheLockError::InvalidPing(_) => exit_codes::INTEGRITY_FAILURE,
            CacheLockError::Io(_) => exit_codes::IO_FAILURE,
            CacheLockError::LockTimeout { .. }
            | CacheLockError::InformationRegionTimeout { .. } => exit_codes::LOCK_FAILURE,
        }
    }
}

/// Result type alias for cachelock operations.
pub type Result<T> = std::result::Result<T, CacheLockError>;
