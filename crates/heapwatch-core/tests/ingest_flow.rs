// crates/heapwatch-core/tests/ingest_flow.rs
// ============================================================================
// Module: Ingest Orchestration Unit Tests
// Description: Start-time handling and best-effort process-metadata writes.
// Purpose: Validate the parse-then-store flow against the store contract.
// Dependencies: heapwatch-core
// ============================================================================

//! ## Overview
//! Exercises [`heapwatch_core::ingest`]: timestamps computed against the
//! run's recorded start time rather than arrival time, implicit run
//! creation, and process-metadata failures that never fail the call.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::time::Duration;

use heapwatch_core::InMemoryRunStore;
use heapwatch_core::ProcessInfo;
use heapwatch_core::Run;
use heapwatch_core::RunStore;
use heapwatch_core::Sample;
use heapwatch_core::StoreError;
use heapwatch_core::ingest;

// ============================================================================
// SECTION: Fault Injection
// ============================================================================

/// Store wrapper whose process-metadata writes always fail.
struct InfoFailingStore {
    /// Delegate store.
    inner: InMemoryRunStore,
}

impl RunStore for InfoFailingStore {
    fn get_run(&self, run_id: &str) -> Result<Run, StoreError> {
        self.inner.get_run(run_id)
    }

    fn store_samples(&self, run_id: &str, samples: Vec<Sample>) -> Result<(), StoreError> {
        self.inner.store_samples(run_id, samples)
    }

    fn store_process_info(&self, _run_id: &str, _info: ProcessInfo) -> Result<(), StoreError> {
        Err(StoreError::Store("injected metadata failure".to_string()))
    }

    fn mark_run_finished(&self, run_id: &str) -> Result<(), StoreError> {
        self.inner.mark_run_finished(run_id)
    }

    fn find_stale_runs(&self, timeout: Duration) -> Result<Vec<String>, StoreError> {
        self.inner.find_stale_runs(timeout)
    }

    fn delete_old_runs(&self, retention: Duration) -> Result<Vec<String>, StoreError> {
        self.inner.delete_old_runs(retention)
    }
}

// ============================================================================
// SECTION: Ingest Flow
// ============================================================================

#[test]
fn first_ingest_creates_the_run_and_counts_samples() {
    let store = InMemoryRunStore::new();
    let report = ingest(
        &store,
        "run-1",
        "00:00:05 | 1 | GradleDaemon | 100MB | 200MB | 300MB",
        None,
    )
    .expect("ingest");
    assert_eq!(report.accepted, 1);
    assert_eq!(report.skipped_lines, 0);
    assert_eq!(report.process_info_stored, None);
    let run = store.get_run("run-1").expect("run exists");
    assert_eq!(run.samples.len(), 1);
}

#[test]
fn timestamps_derive_from_the_recorded_start_time() {
    let store = InMemoryRunStore::new();
    // Seed a run that started well in the past; a later ingest must compute
    // timestamps against that recorded start, not against arrival time.
    let start = 1_600_000_000_000;
    store.insert_run(Run::new("run-1", start)).expect("seed run");
    let report = ingest(
        &store,
        "run-1",
        "00:01:00 | 1 | GradleDaemon | 100MB | 200MB | 300MB",
        None,
    )
    .expect("ingest");
    assert_eq!(report.accepted, 1);
    let run = store.get_run("run-1").expect("run exists");
    assert_eq!(run.samples[0].timestamp, start + 60_000);
}

#[test]
fn batch_of_three_with_one_malformed_stores_two() {
    let store = InMemoryRunStore::new();
    let data = "00:00:01 | 1 | Gradle | 1MB | 2MB | 3MB\n\
                not a sample\n\
                00:00:06 | 1 | Gradle | 4MB | 5MB | 6MB";
    let report = ingest(&store, "run-1", data, None).expect("ingest");
    assert_eq!(report.accepted, 2);
    assert_eq!(report.skipped_lines, 1);
    assert_eq!(store.get_run("run-1").expect("run exists").samples.len(), 2);
}

#[test]
fn fully_malformed_payload_still_touches_the_run() {
    let store = InMemoryRunStore::new();
    let report = ingest(&store, "run-1", "garbage", None).expect("ingest");
    assert_eq!(report.accepted, 0);
    assert_eq!(report.skipped_lines, 1);
    assert!(store.get_run("run-1").is_ok());
}

#[test]
fn process_info_is_stored_alongside_samples() {
    let store = InMemoryRunStore::new();
    let info = ProcessInfo {
        pid: "42".to_string(),
        name: "GradleDaemon".to_string(),
        vm_flags: vec!["-XX:+UseG1GC".to_string()],
    };
    let report = ingest(
        &store,
        "run-1",
        "00:00:01 | 42 | GradleDaemon | 1MB | 2MB | 3MB",
        Some(info),
    )
    .expect("ingest");
    assert_eq!(report.process_info_stored, Some(true));
    assert!(report.process_info_error.is_none());
    let run = store.get_run("run-1").expect("run exists");
    assert_eq!(run.process_info["42"].name, "GradleDaemon");
}

#[test]
fn process_info_failure_never_fails_the_ingest() {
    let store = InfoFailingStore {
        inner: InMemoryRunStore::new(),
    };
    let info = ProcessInfo {
        pid: "42".to_string(),
        name: "GradleDaemon".to_string(),
        vm_flags: Vec::new(),
    };
    let report = ingest(
        &store,
        "run-1",
        "00:00:01 | 42 | GradleDaemon | 1MB | 2MB | 3MB",
        Some(info),
    )
    .expect("ingest must succeed");
    assert_eq!(report.accepted, 1);
    assert_eq!(report.process_info_stored, Some(false));
    assert!(report.process_info_error.is_some());
}
