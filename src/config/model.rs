//! Config struct definition and default implementation.

use serde::{Deserialize, Serialize};

/// Configuration for cachelock.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Milliseconds to wait for a lock held by another owner.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Whether to advertise a port and answer contention pings.
    ///
    /// When disabled, waiters can only poll.
    #[serde(default = "default_true")]
    pub contention_pings: bool,

    // =========================================================================
    // Copy settings
    // =========================================================================
    /// Glob patterns excluded from every file copy in this process.
    #[serde(default)]
    pub global_excludes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            contention_pings: default_true(),
            global_excludes: Vec::new(),
        }
    }
}

pub(crate) fn default_lock_timeout_ms() -> u64 {
    60_000
}

pub(crate) fn default_true() -> bool {
    true
}
