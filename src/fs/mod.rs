//! Filesystem utilities for cachelock.
//!
//! Canonical target paths used as lock identities, and the process-wide
//! exclude patterns shared with file-copy consumers.

mod canonical;
mod excludes;

pub use canonical::canonicalize_target;
pub use excludes::{global_exclude_set, global_excludes, is_globally_excluded, set_global_excludes};

pub(crate) use excludes::build_globset;
