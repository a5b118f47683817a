// src/lib.rs

//! bibsnap
//!
//! Captures point-in-time snapshots of library-account state (loans,
//! reservations, debts, ...) from a remote web API into an immutable,
//! timestamp-named directory tree, and keeps the history compact by
//! collapsing runs of byte-identical snapshots.
//!
//! # Architecture
//!
//! - Capture is all-or-nothing: everything is written under a staging
//!   directory that is atomically renamed into place on success
//! - One authenticated session (and cookie jar) per credential, reused
//!   sequentially across that account's resource fetches
//! - Fetches follow redirects and poll through the server's "cache still
//!   building" sentinel, unbounded by default
//! - Dedup hashes snapshot trees content-addressed (SHA-256 over sorted
//!   children) and deletes interior members of equal-hash runs

pub mod config;
pub mod dedup;
mod error;
pub mod fetch;
pub mod hash;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use config::{Credential, UserConfig};
pub use error::{Error, Result};
pub use hash::{hash_path, ContentHash, TreeEntry};
pub use session::{AccountClient, AccountSession, Endpoints};
pub use snapshot::{SnapshotWriter, STAGING_SUFFIX};
pub use transport::{HttpTransport, ReqwestTransport};
