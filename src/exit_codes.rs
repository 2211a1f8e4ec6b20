//! Exit code constants for the cachelock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unsupported mode, misuse of a lock handle)
//! - 2: Integrity failure (corrupt lock file, target not unlocked cleanly)
//! - 3: I/O failure (disk or socket)
//! - 4: Lock failure (timeout waiting for another owner)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or handle misuse.
pub const USER_ERROR: i32 = 1;

/// Integrity failure: the lock file or the guarded target cannot be trusted.
pub const INTEGRITY_FAILURE: i32 = 2;

/// I/O failure while touching the lock file or the contention socket.
pub const IO_FAILURE: i32 = 3;

/// Lock acquisition failure: the lock is held by another owner.
pub const LOCK_FAILURE: i32 = 4;
