// src/hash.rs

//! Content hashing for snapshot directories.
//!
//! A file hashes to the SHA-256 of its raw bytes. A directory hashes to the
//! SHA-256 of its children's names and hash strings, taken in ascending name
//! order, which makes the result independent of filesystem listing order and
//! recursive to arbitrary depth. Two snapshot directories with equal hashes
//! are identical captures.
//!
//! The recursion is written against the [`TreeEntry`] capability rather than
//! the filesystem directly, so synthetic in-memory trees can be hashed in
//! tests; [`FsEntry`] adapts a real path.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read buffer for streaming file contents through the hasher
const HASH_BUFFER_SIZE: usize = 8192;

/// Hex-encoded SHA-256 digest of a file's bytes or a directory's tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of a hashable tree: a name plus either byte content or children
pub trait TreeEntry: Sized {
    /// Entry name, used both for sorting and as hash input
    fn name(&self) -> &str;

    fn is_dir(&self) -> bool;

    /// Immediate children; only called when `is_dir()` is true
    fn children(&self) -> Result<Vec<Self>>;

    /// Stream this entry's byte content into the digest; only called when
    /// `is_dir()` is false
    fn digest_contents(&self, hasher: &mut Sha256) -> Result<()>;
}

/// Hash one tree entry, recursing through directories
pub fn hash_entry<E: TreeEntry>(entry: &E) -> Result<ContentHash> {
    let mut hasher = Sha256::new();
    if entry.is_dir() {
        let mut children = entry.children()?;
        children.sort_by(|a, b| a.name().cmp(b.name()));
        for child in &children {
            let child_hash = hash_entry(child)?;
            hasher.update(child.name().as_bytes());
            hasher.update(child_hash.as_str().as_bytes());
        }
    } else {
        entry.digest_contents(&mut hasher)?;
    }
    Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file or directory on disk
pub fn hash_path(path: &Path) -> Result<ContentHash> {
    hash_entry(&FsEntry::new(path.to_path_buf()))
}

/// Filesystem adapter for [`TreeEntry`]
pub struct FsEntry {
    path: PathBuf,
    name: String,
}

impl FsEntry {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }
}

impl TreeEntry for FsEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.path.is_dir()
    }

    fn children(&self) -> Result<Vec<Self>> {
        let entries = fs::read_dir(&self.path).map_err(|e| {
            Error::Filesystem(format!("failed to list {}: {e}", self.path.display()))
        })?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::Filesystem(format!("failed to list {}: {e}", self.path.display()))
            })?;
            children.push(FsEntry::new(entry.path()));
        }
        Ok(children)
    }

    fn digest_contents(&self, hasher: &mut Sha256) -> Result<()> {
        let mut file = File::open(&self.path).map_err(|e| {
            Error::Filesystem(format!("failed to open {}: {e}", self.path.display()))
        })?;
        let mut buffer = [0u8; HASH_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buffer).map_err(|e| {
                Error::Filesystem(format!("failed to read {}: {e}", self.path.display()))
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(())
    }
}
