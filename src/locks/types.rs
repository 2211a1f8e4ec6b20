//! Lock mode and ownership information types.

use serde::Serialize;
use std::sync::Arc;

/// Mode of a lock on a target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Multiple readers may hold the lock at the same time.
    Shared,
    /// A single holder may read and write the target.
    Exclusive,
    /// No locking. Rejected at acquisition time.
    None,
}

impl LockMode {
    /// Lowercase name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
            LockMode::None => "none",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership details published in the information region of a lock file.
///
/// This is a snapshot: the real owner may change as soon as the region lock
/// used to read it is released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerInfo {
    /// Port the owner listens on for contention pings, if it advertised one.
    pub port: Option<u16>,

    /// Process identifier of the owner.
    pub pid: String,

    /// Description of the operation the owner is performing.
    pub operation: String,
}

/// Callback run when another process pings for a lock this process holds.
pub type ContendedAction = Arc<dyn Fn() + Send + Sync>;
