// src/snapshot.rs

//! Snapshot capture: staging directory, resource persistence, atomic commit.
//!
//! A capture writes everything under `<base>/<timestamp>.inprogress/` and
//! renames the whole directory to `<base>/<timestamp>/` only when every
//! resource of every credential has been written. Any failure deletes the
//! staging directory and propagates; a partial snapshot is never visible
//! under a committed name.
//!
//! Timestamp names are UTC local-date-time strings whose lexicographic order
//! equals chronological order, so a plain name sort of the base directory
//! yields snapshot history.

use crate::config::Credential;
use crate::error::{Error, Result};
use crate::session::AccountClient;
use chrono::{NaiveDateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Name suffix marking a not-yet-committed snapshot directory
pub const STAGING_SUFFIX: &str = "inprogress";

/// Timestamp layout used for snapshot directory names
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Resources fetched for every account, in order, stored under their own name
const RESOURCES: &[&str] = &["cards", "loans", "debts", "catalogs", "reservations"];

/// Resources whose API path differs from the stored file name
const ALIASED_RESOURCES: &[(&str, &str)] = &[("catalogs/libraries", "libraries")];

/// Current UTC time as a snapshot directory name
pub fn current_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a snapshot directory name back to its instant
///
/// Staging names (and anything else that is not a bare timestamp) do not
/// parse, which is what excludes them from snapshot listings.
pub fn parse_timestamp(name: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Committed snapshot directories under `base_dir`, sorted chronologically
pub fn committed_snapshots(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(base_dir).map_err(|e| {
        Error::Filesystem(format!("failed to list {}: {e}", base_dir.display()))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Filesystem(format!("failed to list {}: {e}", base_dir.display()))
        })?;
        let path = entry.path();
        if path.is_dir() && parse_timestamp(&entry.file_name().to_string_lossy()).is_some() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Captures are skipped while the newest snapshot is younger than this
/// (4 hours minus a 15-minute scheduling margin)
pub const MIN_WAIT_TIME: Duration = Duration::from_secs(4 * 3600 - 15 * 60);

/// Whether a new capture should run, given the newest snapshot's age
///
/// A missing age means no committed snapshot exists yet; `force` bypasses
/// the freshness check entirely.
pub fn should_capture(age: Option<Duration>, force: bool) -> bool {
    force || age.map_or(true, |age| age > MIN_WAIT_TIME)
}

/// Age of the newest committed snapshot, or `None` when there is none
pub fn time_since_last_capture(base_dir: &Path) -> Result<Option<Duration>> {
    let snapshots = committed_snapshots(base_dir)?;
    let Some(latest) = snapshots.last() else {
        return Ok(None);
    };
    let name = latest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(taken) = parse_timestamp(&name) else {
        return Ok(None);
    };
    let age = Utc::now().naive_utc() - taken;
    Ok(Some(age.to_std().unwrap_or(Duration::ZERO)))
}

/// Writes one full capture atomically
pub struct SnapshotWriter {
    base_dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Capture all credentials into a new committed snapshot
    ///
    /// `connect` builds one account client per credential; each client gets
    /// its own session and cookie jar. Returns the committed snapshot path.
    pub fn capture_all<C, F>(&self, credentials: &[Credential], connect: F) -> Result<PathBuf>
    where
        C: AccountClient,
        F: FnMut(&Credential) -> Result<C>,
    {
        self.capture_as(&current_timestamp(), credentials, connect)
    }

    fn capture_as<C, F>(
        &self,
        timestamp: &str,
        credentials: &[Credential],
        connect: F,
    ) -> Result<PathBuf>
    where
        C: AccountClient,
        F: FnMut(&Credential) -> Result<C>,
    {
        let final_dir = self.base_dir.join(timestamp);
        let staging_dir = self
            .base_dir
            .join(format!("{timestamp}.{STAGING_SUFFIX}"));

        fs::create_dir_all(&staging_dir).map_err(|e| {
            Error::Filesystem(format!("failed to create {}: {e}", staging_dir.display()))
        })?;
        info!("writing snapshot to {}", staging_dir.display());

        // The commit rename is part of the fallible scope: a failed move
        // rolls the staging directory back like any other capture error.
        let committed = capture_into(&staging_dir, credentials, connect).and_then(|()| {
            fs::rename(&staging_dir, &final_dir).map_err(|e| {
                Error::Filesystem(format!(
                    "failed to commit {} to {}: {e}",
                    staging_dir.display(),
                    final_dir.display()
                ))
            })
        });

        match committed {
            Ok(()) => {
                info!("committed snapshot {}", final_dir.display());
                Ok(final_dir)
            }
            Err(e) => {
                // Best-effort rollback; the capture error is the one that
                // matters.
                if let Err(cleanup) = fs::remove_dir_all(&staging_dir) {
                    warn!(
                        "failed to clean up staging directory {}: {cleanup}",
                        staging_dir.display()
                    );
                }
                Err(e)
            }
        }
    }
}

fn capture_into<C, F>(staging_dir: &Path, credentials: &[Credential], mut connect: F) -> Result<()>
where
    C: AccountClient,
    F: FnMut(&Credential) -> Result<C>,
{
    for credential in credentials {
        let account_dir = staging_dir.join(&credential.username);
        fs::create_dir_all(&account_dir).map_err(|e| {
            Error::Filesystem(format!("failed to create {}: {e}", account_dir.display()))
        })?;
        let mut client = connect(credential)?;
        capture_account(&account_dir, &mut client, &credential.username)?;
    }
    Ok(())
}

fn capture_account<C: AccountClient>(
    account_dir: &Path,
    client: &mut C,
    username: &str,
) -> Result<()> {
    for name in RESOURCES {
        let body = client.fetch_resource(name)?;
        write_resource(account_dir, name, &body)?;
    }
    save_settings(account_dir, client, username)?;
    for (path, file_name) in ALIASED_RESOURCES {
        let body = client.fetch_resource(path)?;
        write_resource(account_dir, file_name, &body)?;
    }
    Ok(())
}

/// Persist the settings resource with its volatile `id` field stripped
///
/// The `id` value changes on every fetch while carrying no information, and
/// would defeat dedup by making otherwise identical snapshots hash apart.
/// The username and login token are recorded in its place.
fn save_settings<C: AccountClient>(account_dir: &Path, client: &mut C, username: &str) -> Result<()> {
    let body = client.fetch_resource("settings")?;
    let mut value: Value = serde_json::from_slice(&body)
        .map_err(|e| Error::HttpProtocol(format!("settings payload is not JSON: {e}")))?;
    let Value::Object(map) = &mut value else {
        return Err(Error::HttpProtocol(
            "settings payload is not a JSON object".into(),
        ));
    };
    map.remove("id");
    map.insert("username".to_string(), Value::String(username.to_string()));
    if let Some(token) = client.url_token() {
        map.insert("urltoken".to_string(), Value::String(token.to_string()));
    }

    let rendered = serde_json::to_string_pretty(&value)
        .map_err(|e| Error::Filesystem(format!("failed to serialize settings: {e}")))?;
    write_file(account_dir, "settings", &rendered)
}

fn write_resource(account_dir: &Path, name: &str, body: &[u8]) -> Result<()> {
    write_file(account_dir, name, &render_payload(body))
}

/// JSON objects and arrays are stored pretty-printed with 2-space indent;
/// scalars and non-JSON bodies are stored verbatim.
fn render_payload(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
        }
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

fn write_file(account_dir: &Path, name: &str, content: &str) -> Result<()> {
    let path = account_dir.join(name);
    fs::write(&path, content)
        .map_err(|e| Error::Filesystem(format!("failed to write {}: {e}", path.display())))
}
