// crates/heapwatch-core/src/clock.rs
// ============================================================================
// Module: Heapwatch Clock Helpers
// Description: Epoch-millisecond time source and RFC 3339 rendering.
// Purpose: Keep all run timestamps timezone-independent epoch millis.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Every timestamp stored in a run document is an epoch-millisecond `i64`;
//! RFC 3339 strings exist only at the API boundary. This module is the single
//! place that reads the wall clock and the single place that renders millis
//! for human consumption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Clock Helpers
// ============================================================================

/// Returns the current unix epoch time in milliseconds.
#[must_use]
pub fn unix_millis_now() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Renders epoch milliseconds as an RFC 3339 timestamp.
///
/// Out-of-range values fall back to the raw millisecond count so rendering is
/// total and response encoding never fails on a corrupt document.
#[must_use]
pub fn to_rfc3339(millis: i64) -> String {
    let nanos = i128::from(millis) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|stamp| stamp.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
