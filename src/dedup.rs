// src/dedup.rs

//! Collapses runs of byte-identical committed snapshots.
//!
//! The scan is a single forward pass holding the last two (hash, path) pairs
//! seen: when three consecutive snapshots hash equal, the middle one is
//! deleted. The window advances normally after a deletion, so a maximal run
//! of m >= 3 identical snapshots ends with only its first and last member on
//! disk. The run boundaries record when the account state started and
//! stopped being identical.
//!
//! Hashes are recomputed from scratch on every invocation; nothing is cached
//! between runs.

use crate::error::{Error, Result};
use crate::hash::{hash_path, ContentHash};
use crate::snapshot::STAGING_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Delete redundant interior members of equal-hash snapshot runs
///
/// Only committed snapshot directories are considered; staging directories
/// (names carrying the in-progress suffix) are never inspected or deleted.
pub fn dedup(base_dir: &Path) -> Result<()> {
    let mut dirs = committed_children(base_dir)?;
    dirs.sort();
    debug!("running dedup over {} snapshot directories", dirs.len());

    let mut prev1: Option<ContentHash> = None;
    let mut prev2: Option<(ContentHash, PathBuf)> = None;

    for dir in dirs {
        let hash = hash_path(&dir)?;
        if let (Some(h1), Some((h2, victim))) = (&prev1, &prev2) {
            if *h2 == hash && h1 == h2 {
                info!("deleting redundant snapshot {}", victim.display());
                fs::remove_dir_all(victim).map_err(|e| {
                    Error::Filesystem(format!("failed to delete {}: {e}", victim.display()))
                })?;
            }
        }
        prev1 = prev2.take().map(|(h, _)| h);
        prev2 = Some((hash, dir));
    }

    debug!("dedup pass complete");
    Ok(())
}

/// Committed snapshot directories under `base_dir`, unsorted
fn committed_children(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(base_dir).map_err(|e| {
        Error::Filesystem(format!("failed to list {}: {e}", base_dir.display()))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Filesystem(format!("failed to list {}: {e}", base_dir.display()))
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(STAGING_SUFFIX) {
            continue;
        }
        dirs.push(path);
    }
    Ok(dirs)
}
