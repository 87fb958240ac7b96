// crates/heapwatch-core/src/sweep.rs
// ============================================================================
// Module: Heapwatch Lifecycle Sweeps
// Description: Stale-marking and retention-deletion sweep logic.
// Purpose: One implementation shared by background janitors and admin routes.
// Dependencies: crate::store, serde
// ============================================================================

//! ## Overview
//! The two janitor sweeps are plain functions over [`RunStore`]: the stale
//! sweep force-finishes unfinished runs with no recent update, the retention
//! sweep hard-deletes runs past the retention cutoff. Background timer loops
//! and the synchronous admin endpoints call these same functions, so the two
//! paths cannot diverge. Per-run failures are collected into the report and
//! never abort a sweep; both sweeps are idempotent and safe to run
//! concurrently with themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

use crate::store::RunStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Reports
// ============================================================================

/// One run the stale sweep failed to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    /// Run that could not be transitioned.
    pub run_id: String,
    /// Store error message.
    pub error: String,
}

/// Outcome of one stale sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleSweepReport {
    /// Ids the stale scan returned.
    pub stale_found: Vec<String>,
    /// Ids successfully marked finished.
    pub cleaned_runs: Vec<String>,
    /// Per-run finish failures, logged and skipped.
    pub failures: Vec<SweepFailure>,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionSweepReport {
    /// Ids hard-deleted by the sweep.
    pub deleted_runs: Vec<String>,
}

// ============================================================================
// SECTION: Sweeps
// ============================================================================

/// Finds unfinished runs idle longer than `stale_timeout` and marks each
/// finished. A per-run failure is recorded and the sweep continues.
///
/// # Errors
///
/// Returns [`StoreError`] only when the stale scan itself fails.
pub fn stale_sweep(
    store: &dyn RunStore,
    stale_timeout: Duration,
) -> Result<StaleSweepReport, StoreError> {
    let stale_found = store.find_stale_runs(stale_timeout)?;
    let mut cleaned_runs = Vec::with_capacity(stale_found.len());
    let mut failures = Vec::new();
    for run_id in &stale_found {
        match store.mark_run_finished(run_id) {
            Ok(()) => cleaned_runs.push(run_id.clone()),
            Err(err) => failures.push(SweepFailure {
                run_id: run_id.clone(),
                error: err.to_string(),
            }),
        }
    }
    Ok(StaleSweepReport {
        stale_found,
        cleaned_runs,
        failures,
    })
}

/// Hard-deletes runs whose canonical update stamp predates the retention
/// cutoff, regardless of `finished` state.
///
/// # Errors
///
/// Returns [`StoreError`] when the range query fails; individual delete
/// failures are already absorbed by the store operation.
pub fn retention_sweep(
    store: &dyn RunStore,
    retention: Duration,
) -> Result<RetentionSweepReport, StoreError> {
    let deleted_runs = store.delete_old_runs(retention)?;
    Ok(RetentionSweepReport {
        deleted_runs,
    })
}
