// src/error.rs

//! Error types for snapshot capture and deduplication.

use thiserror::Error;

/// Errors surfaced by the capture engine
///
/// Propagation is fail-fast: any error during a single credential's capture
/// aborts the whole multi-credential run and rolls back the staging
/// directory.
#[derive(Error, Debug)]
pub enum Error {
    /// The login page no longer carries the expected token marker
    #[error("login token not found: {0}")]
    MissingToken(String),

    /// Credentials rejected, or the session cookie never appeared
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Non-success, non-redirect status, a redirect without a Location
    /// header, or a transport-level failure
    #[error("http protocol error: {0}")]
    HttpProtocol(String),

    /// I/O failure creating, renaming, or deleting snapshot files
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// Credentials file missing or malformed
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
