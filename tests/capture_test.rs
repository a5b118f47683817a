// tests/capture_test.rs

//! End-to-end capture tests: staging, atomic commit, rollback, and the
//! on-disk snapshot layout, driven by a scripted account client.

use bibsnap::snapshot::{self, SnapshotWriter};
use bibsnap::{AccountClient, Credential, Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Account client answering every resource from a fixed table, optionally
/// failing once a given number of fetches has succeeded.
struct ScriptedClient {
    payloads: HashMap<&'static str, &'static [u8]>,
    fetches_before_failure: Option<u32>,
    fetches: u32,
}

impl ScriptedClient {
    fn new(payloads: HashMap<&'static str, &'static [u8]>) -> Self {
        Self {
            payloads,
            fetches_before_failure: None,
            fetches: 0,
        }
    }

    fn failing_after(mut self, fetches: u32) -> Self {
        self.fetches_before_failure = Some(fetches);
        self
    }
}

impl AccountClient for ScriptedClient {
    fn fetch_resource(&mut self, path: &str) -> Result<Vec<u8>> {
        if let Some(limit) = self.fetches_before_failure {
            if self.fetches >= limit {
                return Err(Error::HttpProtocol(format!(
                    "unexpected status 500 from {path}"
                )));
            }
        }
        self.fetches += 1;
        self.payloads
            .get(path)
            .map(|b| b.to_vec())
            .ok_or_else(|| Error::HttpProtocol(format!("unexpected status 404 from {path}")))
    }

    fn url_token(&self) -> Option<&str> {
        Some("tok-123")
    }
}

fn full_payloads() -> HashMap<&'static str, &'static [u8]> {
    let mut payloads: HashMap<&'static str, &'static [u8]> = HashMap::new();
    payloads.insert("cards", b"[]");
    payloads.insert("loans", br#"[{"title":"Pippi"}]"#);
    payloads.insert("debts", b"[]");
    payloads.insert("catalogs", b"[]");
    payloads.insert("reservations", b"[]");
    payloads.insert("settings", br#"{"id":"volatile-777","language":"sv"}"#);
    payloads.insert("catalogs/libraries", b"[]");
    payloads
}

fn credential(username: &str) -> Credential {
    Credential {
        username: username.to_string(),
        password: "secret".to_string(),
    }
}

fn children(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_successful_capture_commits_full_layout() {
    let temp_dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::new(temp_dir.path());

    let committed = writer
        .capture_all(&[credential("alice"), credential("bob")], |_| {
            Ok(ScriptedClient::new(full_payloads()))
        })
        .unwrap();

    // The committed name is a parseable timestamp with no staging suffix
    let name = committed.file_name().unwrap().to_string_lossy().into_owned();
    assert!(snapshot::parse_timestamp(&name).is_some(), "{name}");
    assert_eq!(children(temp_dir.path()), vec![name]);

    // One subdirectory per credential, one file per resource
    assert_eq!(children(&committed), vec!["alice", "bob"]);
    assert_eq!(
        children(&committed.join("alice")),
        vec!["cards", "catalogs", "debts", "libraries", "loans", "reservations", "settings"]
    );

    // JSON payloads are pretty-printed with 2-space indent
    let loans = fs::read_to_string(committed.join("alice").join("loans")).unwrap();
    assert_eq!(loans, "[\n  {\n    \"title\": \"Pippi\"\n  }\n]");
}

#[test]
fn test_settings_strips_volatile_id() {
    let temp_dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::new(temp_dir.path());

    let committed = writer
        .capture_all(&[credential("alice")], |_| {
            Ok(ScriptedClient::new(full_payloads()))
        })
        .unwrap();

    let settings = fs::read_to_string(committed.join("alice").join("settings")).unwrap();
    assert!(!settings.contains("volatile-777"), "{settings}");
    assert!(settings.contains("\"language\": \"sv\""), "{settings}");
    assert!(settings.contains("\"username\": \"alice\""), "{settings}");
    assert!(settings.contains("\"urltoken\": \"tok-123\""), "{settings}");
}

#[test]
fn test_failed_capture_leaves_nothing_behind() {
    let temp_dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::new(temp_dir.path());

    // Fail while fetching the third resource of the first credential
    let result = writer.capture_all(&[credential("alice"), credential("bob")], |_| {
        Ok(ScriptedClient::new(full_payloads()).failing_after(2))
    });

    assert!(matches!(result, Err(Error::HttpProtocol(_))));
    assert!(
        children(temp_dir.path()).is_empty(),
        "no staging or committed directory may survive a failed capture"
    );
}

#[test]
fn test_second_credential_failure_rolls_back_first() {
    let temp_dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::new(temp_dir.path());

    let mut connected = 0;
    let result = writer.capture_all(&[credential("alice"), credential("bob")], |_| {
        connected += 1;
        if connected == 2 {
            Err(Error::Authentication("login rejected for bob".into()))
        } else {
            Ok(ScriptedClient::new(full_payloads()))
        }
    });

    assert!(matches!(result, Err(Error::Authentication(_))));
    assert!(children(temp_dir.path()).is_empty());
}

#[test]
fn test_capture_then_dedup_collapses_identical_snapshots() {
    let temp_dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::new(temp_dir.path());

    for _ in 0..3 {
        writer
            .capture_all(&[credential("alice")], |_| {
                Ok(ScriptedClient::new(full_payloads()))
            })
            .unwrap();
        // Distinct timestamp names per snapshot
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(children(temp_dir.path()).len(), 3);

    bibsnap::dedup::dedup(temp_dir.path()).unwrap();

    let remaining = children(temp_dir.path());
    assert_eq!(remaining.len(), 2, "middle snapshot deleted: {remaining:?}");
    let all = snapshot::committed_snapshots(temp_dir.path()).unwrap();
    assert_eq!(all.len(), 2);
}
