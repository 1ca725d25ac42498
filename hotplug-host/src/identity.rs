//! File identity tracking
//!
//! A plugin file is identified by the SHA-256 digest of its full contents.
//! An absent file has no digest (`None`), which is distinct from a read error.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::Path;

/// Lowercase hex SHA-256 digest of a plugin file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHash(String);

impl FileHash {
    /// Digest of an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a regular file is present at `path`
pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

/// Digest of the file at `path`, or `None` if there is no such file
pub fn compute_hash(path: &Path) -> io::Result<Option<FileHash>> {
    if !file_exists(path) {
        return Ok(None);
    }
    match std::fs::read(path) {
        Ok(contents) => Ok(Some(FileHash::of_bytes(&contents))),
        // Removed between the check and the read
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether the current digest of `path` differs from `stored`
pub fn file_changed(path: &Path, stored: Option<&FileHash>) -> io::Result<bool> {
    Ok(compute_hash(path)?.as_ref() != stored)
}
