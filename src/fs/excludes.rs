//! Process-wide exclude patterns for file-copy consumers.
//!
//! Setting the patterns replaces the whole list; there is no way to append.
//! No patterns are set by default. The lock manager does not consult them.

use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

static GLOBAL_EXCLUDES: RwLock<Vec<String>> = RwLock::new(Vec::new());

/// Replace the global exclude patterns.
pub fn set_global_excludes<I, S>(patterns: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let patterns = patterns.into_iter().map(Into::into).collect();
    *GLOBAL_EXCLUDES
        .write()
        .unwrap_or_else(PoisonError::into_inner) = patterns;
}

/// The current global exclude patterns.
pub fn global_excludes() -> Vec<String> {
    GLOBAL_EXCLUDES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Compile the current global exclude patterns.
pub fn global_exclude_set() -> Result<GlobSet> {
    Ok(build_globset(&global_excludes())?)
}

/// Whether a relative path matches any global exclude pattern.
pub fn is_globally_excluded(path: &Path) -> Result<bool> {
    Ok(global_exclude_set()?.is_match(path))
}

/// Compile patterns, normalising separators and skipping blank entries.
pub(crate) fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let normalized = pattern.trim().replace('\\', "/");
        if normalized.is_empty() {
            continue;
        }
        builder.add(Glob::new(&normalized)?);
    }

    builder.build()
}
