//! Safe object key resolution
//!
//! Object keys are untrusted, `/`-separated logical names. They are
//! normalized lexically and joined under the backend root; any key that
//! would climb above the root, is absolute, or carries a platform
//! separator other than `/` is rejected with `StorageError::InvalidPath`.

use crate::error::{Result, StorageError};
use std::path::{Path, PathBuf};

/// Confines object keys to a backend root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for the given root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` to a path below the root
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        resolve_path(&self.root, key)
    }
}

/// Join `key` onto `root`, refusing anything that escapes `root`.
///
/// `a/../b` is accepted and resolves to `root/b`; `../b`, `a/../../b` and
/// `/etc/passwd` are rejected. The filesystem is not consulted.
pub fn resolve_path(root: &Path, key: &str) -> Result<PathBuf> {
    let invalid = || StorageError::InvalidPath(key.to_string());

    if key.starts_with('/') || key.contains('\0') || has_foreign_separator(key) {
        return Err(invalid());
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(invalid());
                }
            }
            s => segments.push(s),
        }
    }

    let mut path = root.to_path_buf();
    path.extend(segments);
    Ok(path)
}

#[cfg(windows)]
fn has_foreign_separator(key: &str) -> bool {
    key.contains('\\') || key.contains(':')
}

#[cfg(not(windows))]
fn has_foreign_separator(_key: &str) -> bool {
    false
}
