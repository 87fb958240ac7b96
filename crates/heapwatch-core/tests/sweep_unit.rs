// crates/heapwatch-core/tests/sweep_unit.rs
// ============================================================================
// Module: Lifecycle Sweep Unit Tests
// Description: Stale and retention sweep behavior over injected stores.
// Purpose: Validate log-and-continue semantics and report contents.
// Dependencies: heapwatch-core
// ============================================================================

//! ## Overview
//! Runs the shared sweep functions against the in-memory store, including a
//! fault-injecting wrapper that fails `mark_run_finished` for one run to
//! prove a sweep continues past individual failures.

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
use heapwatch_core::clock;
use heapwatch_core::retention_sweep;
use heapwatch_core::stale_sweep;

// ============================================================================
// SECTION: Fault Injection
// ============================================================================

/// Store wrapper that fails `mark_run_finished` for one configured run id.
struct FinishFailingStore {
    /// Delegate store.
    inner: InMemoryRunStore,
    /// Run id whose finish transition always fails.
    poison: String,
}

impl RunStore for FinishFailingStore {
    fn get_run(&self, run_id: &str) -> Result<Run, StoreError> {
        self.inner.get_run(run_id)
    }

    fn store_samples(&self, run_id: &str, samples: Vec<Sample>) -> Result<(), StoreError> {
        self.inner.store_samples(run_id, samples)
    }

    fn store_process_info(&self, run_id: &str, info: ProcessInfo) -> Result<(), StoreError> {
        self.inner.store_process_info(run_id, info)
    }

    fn mark_run_finished(&self, run_id: &str) -> Result<(), StoreError> {
        if run_id == self.poison {
            return Err(StoreError::Store("injected finish failure".to_string()));
        }
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
// SECTION: Helpers
// ============================================================================

fn seed_aged_run(store: &InMemoryRunStore, id: &str, age: Duration) {
    let aged = clock::unix_millis_now() - i64::try_from(age.as_millis()).unwrap();
    store.insert_run(Run::new(id, aged)).expect("seed run");
}

const STALE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const RETENTION: Duration = Duration::from_secs(3 * 60 * 60);

// ============================================================================
// SECTION: Stale Sweep
// ============================================================================

#[test]
fn stale_sweep_finishes_every_idle_run() {
    let store = InMemoryRunStore::new();
    seed_aged_run(&store, "idle-a", Duration::from_secs(6 * 60));
    seed_aged_run(&store, "idle-b", Duration::from_secs(10 * 60));
    seed_aged_run(&store, "fresh", Duration::from_secs(60));
    let report = stale_sweep(&store, STALE_TIMEOUT).expect("sweep");
    assert_eq!(report.stale_found.len(), 2);
    assert_eq!(report.cleaned_runs.len(), 2);
    assert!(report.failures.is_empty());
    assert!(store.get_run("idle-a").expect("run exists").finished);
    assert!(store.get_run("idle-b").expect("run exists").finished);
    assert!(!store.get_run("fresh").expect("run exists").finished);
}

#[test]
fn stale_sweep_continues_past_a_failing_run() {
    let inner = InMemoryRunStore::new();
    seed_aged_run(&inner, "idle-a", Duration::from_secs(6 * 60));
    seed_aged_run(&inner, "idle-b", Duration::from_secs(6 * 60));
    let store = FinishFailingStore {
        inner: inner.clone(),
        poison: "idle-a".to_string(),
    };
    let report = stale_sweep(&store, STALE_TIMEOUT).expect("sweep");
    assert_eq!(report.stale_found.len(), 2);
    assert_eq!(report.cleaned_runs, vec!["idle-b".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].run_id, "idle-a");
    assert!(inner.get_run("idle-b").expect("run exists").finished);
}

#[test]
fn stale_sweep_is_idempotent() {
    let store = InMemoryRunStore::new();
    seed_aged_run(&store, "idle", Duration::from_secs(6 * 60));
    let first = stale_sweep(&store, STALE_TIMEOUT).expect("first sweep");
    assert_eq!(first.cleaned_runs.len(), 1);
    let second = stale_sweep(&store, STALE_TIMEOUT).expect("second sweep");
    assert!(second.stale_found.is_empty());
    assert!(second.cleaned_runs.is_empty());
}

// ============================================================================
// SECTION: Retention Sweep
// ============================================================================

#[test]
fn retention_sweep_reports_deleted_ids() {
    let store = InMemoryRunStore::new();
    seed_aged_run(&store, "ancient", Duration::from_secs(4 * 60 * 60));
    seed_aged_run(&store, "recent", Duration::from_secs(60));
    let report = retention_sweep(&store, RETENTION).expect("sweep");
    assert_eq!(report.deleted_runs, vec!["ancient".to_string()]);
    assert!(store.get_run("ancient").is_err());
    assert!(store.get_run("recent").is_ok());
}

#[test]
fn retention_sweep_on_empty_store_is_empty() {
    let store = InMemoryRunStore::new();
    let report = retention_sweep(&store, RETENTION).expect("sweep");
    assert!(report.deleted_runs.is_empty());
}
