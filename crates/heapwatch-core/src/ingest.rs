// crates/heapwatch-core/src/ingest.rs
// ============================================================================
// Module: Heapwatch Ingestion Pipeline
// Description: Sample-line parsing and the ingest orchestration.
// Purpose: Turn producer payloads into stored sample batches, tolerantly.
// Dependencies: crate::{clock, model, store}
// ============================================================================

//! ## Overview
//! The producer ships free-text payloads of pipe-delimited lines:
//!
//! ```text
//! HH:MM:SS | PID | NAME | HEAP_USED | HEAP_CAP | RSS [| GC_TIME]
//! ```
//!
//! Parsing is per-line and never fails a batch: malformed lines are skipped
//! and counted. Timestamps are computed against the run's recorded start
//! time, fetched from storage before parsing, so every sample in one polling
//! cycle carries the same elapsed offset regardless of clock drift between
//! samples.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::clock;
use crate::model::ProcessInfo;
use crate::model::Sample;
use crate::store::RunStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Placeholder the producer sends when a metric is unavailable.
const UNAVAILABLE: &str = "N/A";

/// Result of parsing one ingest payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    /// Samples parsed in line order.
    pub samples: Vec<Sample>,
    /// Count of non-empty lines skipped as malformed.
    pub skipped_lines: usize,
}

/// Parses an ingest payload into samples owned by `run_id`.
///
/// `start_time_millis` is the run's recorded start time; each sample's
/// absolute timestamp is `start_time_millis + elapsed seconds`.
#[must_use]
pub fn parse_samples(data: &str, run_id: &str, start_time_millis: i64) -> ParsedBatch {
    let mut samples = Vec::new();
    let mut skipped_lines = 0;
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, run_id, start_time_millis) {
            Some(sample) => samples.push(sample),
            None => skipped_lines += 1,
        }
    }
    ParsedBatch {
        samples,
        skipped_lines,
    }
}

/// Parses one trimmed, non-empty line; `None` skips it.
fn parse_line(line: &str, run_id: &str, start_time_millis: i64) -> Option<Sample> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    if parts.len() != 6 && parts.len() != 7 {
        return None;
    }
    let elapsed_seconds = parse_elapsed(parts[0])?;
    let heap_used_mb = parse_megabytes(parts[3])?;
    let heap_cap_mb = parse_megabytes(parts[4])?;
    let rss_mb = parse_megabytes(parts[5])?;
    let gc_time_seconds = if parts.len() == 7 {
        parse_gc_time(parts[6])
    } else {
        None
    };
    let elapsed_millis = i64::try_from(elapsed_seconds).ok()?.checked_mul(1_000)?;
    Some(Sample {
        timestamp: start_time_millis.saturating_add(elapsed_millis),
        elapsed_seconds,
        pid: parts[1].to_string(),
        name: parts[2].to_string(),
        heap_used_mb,
        heap_cap_mb,
        rss_mb,
        gc_time_seconds,
        run_id: run_id.to_string(),
    })
}

/// Parses `HH:MM:SS` into elapsed seconds since run start.
fn parse_elapsed(field: &str) -> Option<u64> {
    let mut pieces = field.split(':');
    let hours: u64 = pieces.next()?.parse().ok()?;
    let minutes: u64 = pieces.next()?.parse().ok()?;
    let seconds: u64 = pieces.next()?.parse().ok()?;
    if pieces.next().is_some() {
        return None;
    }
    Some(hours * 3_600 + minutes * 60 + seconds)
}

/// Parses an `MB`-suffixed numeric field. `N/A` is a valid "unavailable"
/// placeholder (`Some(None)`); unparseable text skips the line (`None`).
fn parse_megabytes(field: &str) -> Option<Option<f64>> {
    if field == UNAVAILABLE || field.is_empty() {
        return Some(None);
    }
    let trimmed = field.strip_suffix("MB").unwrap_or(field).trim();
    trimmed.parse::<f64>().ok().map(Some)
}

/// Parses the optional GC-time column into seconds. `N/A` and empty mean
/// absent; present-but-unparseable defaults to zero; an `ms` suffix is
/// normalized to seconds.
fn parse_gc_time(field: &str) -> Option<f64> {
    if field == UNAVAILABLE || field.is_empty() {
        return None;
    }
    if let Some(millis) = field.strip_suffix("ms") {
        return Some(millis.trim().parse::<f64>().map_or(0.0, |value| value / 1_000.0));
    }
    let stripped = field.strip_suffix('s').unwrap_or(field).trim();
    Some(stripped.parse::<f64>().unwrap_or(0.0))
}

// ============================================================================
// SECTION: Ingest Orchestration
// ============================================================================

/// Outcome of one ingest call, suitable for audit logging and the API reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Run the batch was stored under.
    pub run_id: String,
    /// Samples parsed and stored.
    pub accepted: usize,
    /// Non-empty lines skipped as malformed.
    pub skipped_lines: usize,
    /// Whether attached process metadata was stored; `None` when the request
    /// carried none.
    pub process_info_stored: Option<bool>,
    /// Error message from the best-effort process-metadata write.
    pub process_info_error: Option<String>,
}

/// Parses and stores one ingest payload.
///
/// The run's recorded start time is fetched before parsing; a run that does
/// not exist yet gets the current instant, matching the document the store
/// synthesizes. The sample batch is stored even when empty so the run is
/// created and its update stamp refreshed. Process metadata is stored
/// best-effort: its failure is reported but never fails the call.
///
/// # Errors
///
/// Returns [`StoreError`] when the start-time lookup (other than a missing
/// run) or the sample write fails.
pub fn ingest(
    store: &dyn RunStore,
    run_id: &str,
    data: &str,
    process_info: Option<ProcessInfo>,
) -> Result<IngestReport, StoreError> {
    let start_time_millis = match store.get_run(run_id) {
        Ok(run) => run.start_time,
        Err(err) if err.is_not_found() => clock::unix_millis_now(),
        Err(err) => return Err(err),
    };
    let batch = parse_samples(data, run_id, start_time_millis);
    let accepted = batch.samples.len();
    store.store_samples(run_id, batch.samples)?;
    let (process_info_stored, process_info_error) = match process_info {
        None => (None, None),
        Some(info) => match store.store_process_info(run_id, info) {
            Ok(()) => (Some(true), None),
            Err(err) => (Some(false), Some(err.to_string())),
        },
    };
    Ok(IngestReport {
        run_id: run_id.to_string(),
        accepted,
        skipped_lines: batch.skipped_lines,
        process_info_stored,
        process_info_error,
    })
}
