// crates/heapwatch-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Durability, mirror-column, and lifecycle tests.
// Purpose: Prove the SQLite store satisfies the RunStore contract.
// Dependencies: heapwatch-store-sqlite, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Exercises the `SQLite` run store against a temporary database file:
//! document round-trips, implicit creation, finish idempotence, stale and
//! retention queries over the mirrored columns, schema-version gating, and
//! corruption detection.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and direct database pokes are permitted."
)]

use std::path::Path;
use std::time::Duration;

use heapwatch_core::ProcessInfo;
use heapwatch_core::RunStore;
use heapwatch_core::Sample;
use heapwatch_core::StoreError;
use heapwatch_core::clock;
use heapwatch_store_sqlite::SqliteRunStore;
use heapwatch_store_sqlite::SqliteStoreConfig;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_store(dir: &TempDir) -> SqliteRunStore {
    let config = SqliteStoreConfig::with_path(dir.path().join("runs.db"));
    SqliteRunStore::new(&config).expect("open sqlite store")
}

fn sample(run_id: &str, elapsed_seconds: u64) -> Sample {
    Sample {
        timestamp: 1_700_000_000_000 + i64::try_from(elapsed_seconds).unwrap() * 1_000,
        elapsed_seconds,
        pid: "2245".to_string(),
        name: "GradleDaemon".to_string(),
        heap_used_mb: Some(100.0),
        heap_cap_mb: Some(200.0),
        rss_mb: None,
        gc_time_seconds: Some(0.25),
        run_id: run_id.to_string(),
    }
}

/// Rewrites the mirrored update stamp (and the document's matching fields)
/// so a run appears `age` old.
fn age_run(db_path: &Path, run_id: &str, age: Duration) {
    let aged = clock::unix_millis_now() - i64::try_from(age.as_millis()).unwrap();
    let connection = Connection::open(db_path).expect("open raw connection");
    let doc: String = connection
        .query_row("SELECT doc FROM runs WHERE run_id = ?1", params![run_id], |row| row.get(0))
        .expect("run row exists");
    let mut document: serde_json::Value = serde_json::from_str(&doc).expect("decode document");
    document["updated_at"] = serde_json::Value::from(aged);
    document["updated_at_timestamp"] = serde_json::Value::from(aged);
    connection
        .execute(
            "UPDATE runs SET doc = ?1, updated_at_ms = ?2 WHERE run_id = ?3",
            params![document.to_string(), aged, run_id],
        )
        .expect("age run row");
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn get_run_misses_with_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    assert!(matches!(store.get_run("absent"), Err(StoreError::NotFound(_))));
}

#[test]
fn documents_round_trip_through_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("run-1", vec![sample("run-1", 0), sample("run-1", 5)]).expect("store");
    store
        .store_process_info(
            "run-1",
            ProcessInfo {
                pid: "2245".to_string(),
                name: "GradleDaemon".to_string(),
                vm_flags: vec!["-XX:+UseG1GC".to_string()],
            },
        )
        .expect("store info");
    let run = store.get_run("run-1").expect("run exists");
    assert_eq!(run.id, "run-1");
    assert_eq!(run.samples.len(), 2);
    assert_eq!(run.samples[1].elapsed_seconds, 5);
    assert_eq!(run.samples[0].gc_time_seconds, Some(0.25));
    assert_eq!(run.samples[0].rss_mb, None);
    assert_eq!(run.process_info["2245"].vm_flags, vec!["-XX:+UseG1GC".to_string()]);
}

#[test]
fn store_survives_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = open_store(&dir);
        store.store_samples("run-1", vec![sample("run-1", 0)]).expect("store");
    }
    let store = open_store(&dir);
    assert_eq!(store.get_run("run-1").expect("run exists").samples.len(), 1);
}

#[test]
fn appends_accumulate_across_batches() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("run-1", vec![sample("run-1", 0)]).expect("first");
    store.store_samples("run-1", vec![sample("run-1", 5), sample("run-1", 10)]).expect("second");
    assert_eq!(store.get_run("run-1").expect("run exists").samples.len(), 3);
}

#[test]
fn foreign_samples_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    let result = store.store_samples("run-1", vec![sample("run-2", 0)]);
    assert!(matches!(result, Err(StoreError::Invalid(_))));
}

#[test]
fn finish_is_idempotent_and_requires_existence() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    assert!(matches!(store.mark_run_finished("absent"), Err(StoreError::NotFound(_))));
    store.store_samples("run-1", Vec::new()).expect("create run");
    store.mark_run_finished("run-1").expect("first finish");
    let first = store.get_run("run-1").expect("run exists");
    store.mark_run_finished("run-1").expect("second finish");
    let second = store.get_run("run-1").expect("run exists");
    assert!(second.finished);
    assert_eq!(first.finished_at, second.finished_at);
    assert_eq!(first.updated_at, second.updated_at);
}

// ============================================================================
// SECTION: Mirror Columns
// ============================================================================

#[test]
fn mirrored_update_stamp_matches_the_document() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("run-1", vec![sample("run-1", 0)]).expect("store");
    let run = store.get_run("run-1").expect("run exists");
    let connection = Connection::open(dir.path().join("runs.db")).expect("raw connection");
    let (updated_at_ms, finished): (i64, i64) = connection
        .query_row(
            "SELECT updated_at_ms, finished FROM runs WHERE run_id = ?1",
            params!["run-1"],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("mirror row");
    assert_eq!(updated_at_ms, run.updated_at_timestamp);
    assert_eq!(run.updated_at, run.updated_at_timestamp);
    assert_eq!(finished, 0);
}

#[test]
fn finish_updates_the_mirrored_flag() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("run-1", Vec::new()).expect("create run");
    store.mark_run_finished("run-1").expect("finish");
    let connection = Connection::open(dir.path().join("runs.db")).expect("raw connection");
    let finished: i64 = connection
        .query_row("SELECT finished FROM runs WHERE run_id = ?1", params!["run-1"], |row| {
            row.get(0)
        })
        .expect("mirror row");
    assert_eq!(finished, 1);
}

// ============================================================================
// SECTION: Stale Scan and Retention
// ============================================================================

#[test]
fn stale_scan_uses_the_inactivity_window() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("idle", Vec::new()).expect("create idle");
    store.store_samples("fresh", Vec::new()).expect("create fresh");
    store.store_samples("done", Vec::new()).expect("create done");
    store.mark_run_finished("done").expect("finish done");
    let db = dir.path().join("runs.db");
    age_run(&db, "idle", Duration::from_secs(6 * 60));
    age_run(&db, "fresh", Duration::from_secs(4 * 60));
    age_run(&db, "done", Duration::from_secs(60 * 60));
    let stale = store.find_stale_runs(Duration::from_secs(5 * 60)).expect("scan");
    assert_eq!(stale, vec!["idle".to_string()]);
}

#[test]
fn retention_deletes_past_the_cutoff_regardless_of_finished() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("old-open", Vec::new()).expect("create");
    store.store_samples("old-done", Vec::new()).expect("create");
    store.store_samples("recent", Vec::new()).expect("create");
    store.mark_run_finished("old-done").expect("finish");
    let db = dir.path().join("runs.db");
    age_run(&db, "old-open", Duration::from_secs(4 * 60 * 60));
    age_run(&db, "old-done", Duration::from_secs(4 * 60 * 60));
    age_run(&db, "recent", Duration::from_secs(2 * 60 * 60));
    let deleted = store.delete_old_runs(Duration::from_secs(3 * 60 * 60)).expect("sweep");
    assert_eq!(deleted, vec!["old-done".to_string(), "old-open".to_string()]);
    assert!(store.get_run("old-open").is_err());
    assert!(store.get_run("recent").is_ok());
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

#[test]
fn unknown_schema_version_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("runs.db");
    {
        let store = SqliteRunStore::new(&SqliteStoreConfig::with_path(&db));
        assert!(store.is_ok());
    }
    let connection = Connection::open(&db).expect("raw connection");
    connection.execute("UPDATE store_meta SET version = 99", params![]).expect("bump version");
    drop(connection);
    let reopened = SqliteRunStore::new(&SqliteStoreConfig::with_path(&db));
    assert!(reopened.is_err());
}

#[test]
fn document_key_mismatch_is_invalid() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("run-1", Vec::new()).expect("create run");
    let connection = Connection::open(dir.path().join("runs.db")).expect("raw connection");
    let doc: String = connection
        .query_row("SELECT doc FROM runs WHERE run_id = ?1", params!["run-1"], |row| row.get(0))
        .expect("doc");
    connection
        .execute(
            "INSERT INTO runs (run_id, doc, updated_at_ms, finished) VALUES (?1, ?2, 0, 0)",
            params!["run-2", doc],
        )
        .expect("insert mismatched row");
    drop(connection);
    assert!(matches!(store.get_run("run-2"), Err(StoreError::Invalid(_))));
}

#[test]
fn corrupt_document_is_invalid() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    store.store_samples("run-1", Vec::new()).expect("create run");
    let connection = Connection::open(dir.path().join("runs.db")).expect("raw connection");
    connection
        .execute("UPDATE runs SET doc = 'not json' WHERE run_id = ?1", params!["run-1"])
        .expect("corrupt row");
    drop(connection);
    assert!(matches!(store.get_run("run-1"), Err(StoreError::Invalid(_))));
}
