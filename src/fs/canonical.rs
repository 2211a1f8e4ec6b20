//! Canonical paths for targets that may not exist yet.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute, symlink-free form.
///
/// Unlike [`std::fs::canonicalize`] the target does not need to exist: `.`
/// and `..` are resolved lexically, the longest existing ancestor is
/// canonicalized, and the remaining components are appended unchanged.
pub fn canonicalize_target(path: &Path) -> io::Result<PathBuf> {
    let normalized = normalize_lexically(&std::path::absolute(path)?);

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut canonical) => {
                canonical.extend(missing.iter().rev());
                return Ok(canonical);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(e);
                };
                missing.push(name);
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
