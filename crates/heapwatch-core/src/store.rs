// crates/heapwatch-core/src/store.rs
// ============================================================================
// Module: Heapwatch Run Store Interface
// Description: Persistence interface for run documents plus in-memory store.
// Purpose: Keep storage swappable behind one trait with five operations.
// Dependencies: crate::{clock, model}, thiserror
// ============================================================================

//! ## Overview
//! [`RunStore`] is the only surface allowed to touch persistent storage. Each
//! operation is a read-modify-write of one whole run document; implementations
//! must execute every operation as a single critical section with respect to
//! other store calls for the same run id, so concurrent writers serialize
//! instead of losing appends. The in-memory store here is the reference
//! implementation used by tests and local runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::clock;
use crate::model::ProcessInfo;
use crate::model::Run;
use crate::model::Sample;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Run store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested run does not exist.
    #[error("run not found: {0}")]
    NotFound(String),
    /// Underlying storage failure.
    #[error("store error: {0}")]
    Store(String),
    /// Stored data violates a document invariant.
    #[error("invalid store data: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Returns true when the error is a missing-run lookup miss.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Persistence interface for run documents.
///
/// # Invariants
/// - Every mutating operation refreshes the `updated_at` pair via
///   [`Run::touch`].
/// - `mark_run_finished` is idempotent and never reverts `finished`.
/// - Operations on one run id are atomic with respect to each other.
pub trait RunStore: Send + Sync {
    /// Fetches a run document by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the run does not exist.
    fn get_run(&self, run_id: &str) -> Result<Run, StoreError>;

    /// Appends a batch of samples, synthesizing the run on first ingest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when a sample's `run_id` does not
    /// match `run_id`, or [`StoreError::Store`] on storage failure.
    fn store_samples(&self, run_id: &str, samples: Vec<Sample>) -> Result<(), StoreError>;

    /// Merges one process-metadata entry into the run's pid map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] on storage failure. Callers treat this
    /// operation as best-effort.
    fn store_process_info(&self, run_id: &str, info: ProcessInfo) -> Result<(), StoreError>;

    /// Marks a run finished; succeeds without mutation when already finished.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the run does not exist.
    fn mark_run_finished(&self, run_id: &str) -> Result<(), StoreError>;

    /// Returns ids of unfinished runs not updated within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the scan fails.
    fn find_stale_runs(&self, timeout: Duration) -> Result<Vec<String>, StoreError>;

    /// Hard-deletes runs whose canonical update stamp predates the retention
    /// cutoff, regardless of `finished`. Continues past individual delete
    /// failures and returns the ids actually deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the range query itself fails.
    fn delete_old_runs(&self, retention: Duration) -> Result<Vec<String>, StoreError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory run store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunStore {
    /// Run documents keyed by run id, guarded by one mutex so each store
    /// operation is a single critical section.
    runs: Arc<Mutex<BTreeMap<String, Run>>>,
}

impl InMemoryRunStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Inserts or replaces a whole run document. Fixture seeding for tests
    /// and tools; production mutation goes through the trait operations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn insert_run(&self, run: Run) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.insert(run.id.clone(), run);
        Ok(())
    }

    /// Locks the run map, translating poisoning into a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Run>>, StoreError> {
        self.runs.lock().map_err(|_| StoreError::Store("run store mutex poisoned".to_string()))
    }
}

impl RunStore for InMemoryRunStore {
    fn get_run(&self, run_id: &str) -> Result<Run, StoreError> {
        let guard = self.lock()?;
        guard.get(run_id).cloned().ok_or_else(|| StoreError::NotFound(run_id.to_string()))
    }

    fn store_samples(&self, run_id: &str, samples: Vec<Sample>) -> Result<(), StoreError> {
        validate_sample_ownership(run_id, &samples)?;
        let now = clock::unix_millis_now();
        let mut guard = self.lock()?;
        let run = guard.entry(run_id.to_string()).or_insert_with(|| Run::new(run_id, now));
        run.samples.extend(samples);
        run.touch(now);
        Ok(())
    }

    fn store_process_info(&self, run_id: &str, info: ProcessInfo) -> Result<(), StoreError> {
        let now = clock::unix_millis_now();
        let mut guard = self.lock()?;
        let run = guard.entry(run_id.to_string()).or_insert_with(|| Run::new(run_id, now));
        run.process_info.insert(info.pid.clone(), info);
        run.touch(now);
        Ok(())
    }

    fn mark_run_finished(&self, run_id: &str) -> Result<(), StoreError> {
        let now = clock::unix_millis_now();
        let mut guard = self.lock()?;
        let run = guard.get_mut(run_id).ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
        run.finish(now);
        Ok(())
    }

    fn find_stale_runs(&self, timeout: Duration) -> Result<Vec<String>, StoreError> {
        let now = clock::unix_millis_now();
        let timeout_millis = duration_millis(timeout);
        let guard = self.lock()?;
        Ok(guard
            .values()
            .filter(|run| !run.finished)
            .filter(|run| now.saturating_sub(run.updated_at_timestamp) > timeout_millis)
            .map(|run| run.id.clone())
            .collect())
    }

    fn delete_old_runs(&self, retention: Duration) -> Result<Vec<String>, StoreError> {
        let cutoff = clock::unix_millis_now().saturating_sub(duration_millis(retention));
        let mut guard = self.lock()?;
        let doomed: Vec<String> = guard
            .values()
            .filter(|run| run.updated_at_timestamp < cutoff)
            .map(|run| run.id.clone())
            .collect();
        for id in &doomed {
            guard.remove(id);
        }
        Ok(doomed)
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared run store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedRunStore {
    /// Inner store implementation.
    inner: Arc<dyn RunStore>,
}

impl SharedRunStore {
    /// Wraps a run store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl RunStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl RunStore for SharedRunStore {
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

/// Rejects samples stored under a run id they do not belong to.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] naming the first offending sample.
pub fn validate_sample_ownership(
    run_id: &str,
    samples: &[Sample],
) -> Result<(), StoreError> {
    match samples.iter().find(|sample| sample.run_id != run_id) {
        Some(sample) => Err(StoreError::Invalid(format!(
            "sample run_id {} does not match run {run_id}",
            sample.run_id
        ))),
        None => Ok(()),
    }
}

/// Converts a duration into saturating epoch-milliseconds.
#[must_use]
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
