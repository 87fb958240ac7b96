// crates/heapwatch-core/src/model.rs
// ============================================================================
// Module: Heapwatch Data Model
// Description: Run, sample, and process-metadata document types.
// Purpose: Define the persisted shape of a monitoring run and its invariants.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Run`] is the aggregate unit of monitoring: an opaque id, an
//! append-only sequence of [`Sample`] observations, per-process metadata, and
//! lifecycle flags. Runs are created implicitly on first ingest and mutated
//! only through [`crate::store::RunStore`] operations.
//!
//! # Invariants
//! - `finished` is monotonic: once true it never reverts.
//! - `updated_at` and `updated_at_timestamp` are written together by
//!   [`Run::touch`] and never disagree; `updated_at_timestamp` is the
//!   canonical field for range queries.
//! - Every sample's `run_id` equals the id of the run it is stored under.
//! - Process-metadata entries are whole-entry writes keyed by pid.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Sample
// ============================================================================

/// One memory/GC observation for one process, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock epoch millis, derived as run start time plus elapsed time.
    pub timestamp: i64,
    /// Seconds since run start as reported by the producer.
    pub elapsed_seconds: u64,
    /// Operating-system process id (opaque string).
    pub pid: String,
    /// Process display name.
    pub name: String,
    /// Heap used in MB; `None` when the producer reported `N/A`.
    pub heap_used_mb: Option<f64>,
    /// Heap capacity in MB; `None` when the producer reported `N/A`.
    pub heap_cap_mb: Option<f64>,
    /// Resident set size in MB; `None` when the producer reported `N/A`.
    pub rss_mb: Option<f64>,
    /// GC time in seconds; absent when the line had no GC column or `N/A`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_time_seconds: Option<f64>,
    /// Identifier of the owning run.
    pub run_id: String,
}

// ============================================================================
// SECTION: Process Metadata
// ============================================================================

/// Static per-process metadata captured at most once per pid within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Operating-system process id (opaque string).
    pub pid: String,
    /// Process display name.
    pub name: String,
    /// JVM flags the process was launched with.
    #[serde(default)]
    pub vm_flags: Vec<String>,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// The aggregate monitoring-run document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Opaque run identifier (caller supplied).
    pub id: String,
    /// Epoch millis fixed at first ingest; sample timestamps derive from it.
    pub start_time: i64,
    /// Epoch millis the document was created.
    pub created_at: i64,
    /// Epoch millis of the last mutation.
    pub updated_at: i64,
    /// Duplicate of `updated_at` kept as the canonical range-query field.
    pub updated_at_timestamp: i64,
    /// Append-only sample sequence in arrival order.
    #[serde(default)]
    pub samples: Vec<Sample>,
    /// Per-process metadata keyed by pid.
    #[serde(default)]
    pub process_info: BTreeMap<String, ProcessInfo>,
    /// Lifecycle flag; one-way false to true.
    #[serde(default)]
    pub finished: bool,
    /// Epoch millis of the finish transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl Run {
    /// Creates a fresh run document with all timestamps at `now_millis`.
    #[must_use]
    pub fn new(id: impl Into<String>, now_millis: i64) -> Self {
        Self {
            id: id.into(),
            start_time: now_millis,
            created_at: now_millis,
            updated_at: now_millis,
            updated_at_timestamp: now_millis,
            samples: Vec::new(),
            process_info: BTreeMap::new(),
            finished: false,
            finished_at: None,
        }
    }

    /// Refreshes `updated_at` and `updated_at_timestamp` together.
    pub const fn touch(&mut self, now_millis: i64) {
        self.updated_at = now_millis;
        self.updated_at_timestamp = now_millis;
    }

    /// Marks the run finished. Returns `false` without mutating anything when
    /// the run is already finished.
    pub const fn finish(&mut self, now_millis: i64) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.finished_at = Some(now_millis);
        self.touch(now_millis);
        true
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
