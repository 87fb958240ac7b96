// crates/heapwatch-core/tests/sample_parsing.rs
// ============================================================================
// Module: Sample Parser Unit Tests
// Description: Line-format, tolerance, and GC-column parsing tests.
// Purpose: Pin the producer wire format and the skip-and-continue policy.
// Dependencies: heapwatch-core, proptest
// ============================================================================

//! ## Overview
//! Pins the pipe-delimited sample format: elapsed-time arithmetic against
//! the run start time, `MB`/`s`/`ms` suffix stripping, `N/A` placeholders,
//! and per-line skip behavior for malformed input.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::float_cmp,
    reason = "Test-only assertions and exact float fixtures are permitted."
)]

use heapwatch_core::parse_samples;
use proptest::prelude::proptest;

// ============================================================================
// SECTION: Constants
// ============================================================================

const START: i64 = 1_700_000_000_000;

// ============================================================================
// SECTION: Well-Formed Lines
// ============================================================================

#[test]
fn six_column_line_parses_without_gc() {
    let batch =
        parse_samples("00:01:30 | 123 | GradleDaemon | 100MB | 200MB | 300MB", "run-1", START);
    assert_eq!(batch.skipped_lines, 0);
    assert_eq!(batch.samples.len(), 1);
    let sample = &batch.samples[0];
    assert_eq!(sample.elapsed_seconds, 90);
    assert_eq!(sample.timestamp, START + 90_000);
    assert_eq!(sample.pid, "123");
    assert_eq!(sample.name, "GradleDaemon");
    assert_eq!(sample.heap_used_mb, Some(100.0));
    assert_eq!(sample.heap_cap_mb, Some(200.0));
    assert_eq!(sample.rss_mb, Some(300.0));
    assert_eq!(sample.gc_time_seconds, None);
    assert_eq!(sample.run_id, "run-1");
}

#[test]
fn seventh_column_parses_gc_seconds() {
    let batch = parse_samples(
        "00:01:30 | 123 | GradleDaemon | 100MB | 200MB | 300MB | 0.250s",
        "run-1",
        START,
    );
    assert_eq!(batch.samples[0].gc_time_seconds, Some(0.25));
}

#[test]
fn gc_millisecond_suffix_normalizes_to_seconds() {
    let batch = parse_samples(
        "00:00:05 | 9 | KotlinDaemon | 10MB | 20MB | 30MB | 250ms",
        "run-1",
        START,
    );
    assert_eq!(batch.samples[0].gc_time_seconds, Some(0.25));
}

#[test]
fn fractional_megabytes_are_preserved() {
    let batch = parse_samples("00:00:01 | 1 | Gradle | 100.5MB | 200.25MB | 300MB", "run-1", START);
    assert_eq!(batch.samples[0].heap_used_mb, Some(100.5));
    assert_eq!(batch.samples[0].heap_cap_mb, Some(200.25));
}

#[test]
fn hours_roll_into_elapsed_seconds() {
    let batch = parse_samples("02:10:05 | 1 | Gradle | 1MB | 2MB | 3MB", "run-1", START);
    assert_eq!(batch.samples[0].elapsed_seconds, 2 * 3_600 + 10 * 60 + 5);
}

// ============================================================================
// SECTION: Unavailable Placeholders
// ============================================================================

#[test]
fn unavailable_heap_keeps_the_line() {
    let batch = parse_samples("00:00:01 | 1 | Gradle | N/A | 200MB | 300MB", "run-1", START);
    assert_eq!(batch.skipped_lines, 0);
    assert_eq!(batch.samples[0].heap_used_mb, None);
    assert_eq!(batch.samples[0].heap_cap_mb, Some(200.0));
}

#[test]
fn unavailable_gc_means_absent_not_zero() {
    let batch = parse_samples("00:00:01 | 1 | Gradle | 1MB | 2MB | 3MB | N/A", "run-1", START);
    assert_eq!(batch.samples[0].gc_time_seconds, None);
}

#[test]
fn unparseable_gc_defaults_to_zero() {
    let batch = parse_samples("00:00:01 | 1 | Gradle | 1MB | 2MB | 3MB | bogus", "run-1", START);
    assert_eq!(batch.samples[0].gc_time_seconds, Some(0.0));
}

// ============================================================================
// SECTION: Malformed Lines
// ============================================================================

#[test]
fn four_column_line_is_skipped() {
    let batch = parse_samples("00:00:01 | 1 | Gradle | 1MB", "run-1", START);
    assert!(batch.samples.is_empty());
    assert_eq!(batch.skipped_lines, 1);
}

#[test]
fn one_bad_line_does_not_fail_the_batch() {
    let data = "00:00:01 | 1 | Gradle | 1MB | 2MB | 3MB\n\
                broken line\n\
                00:00:06 | 1 | Gradle | 4MB | 5MB | 6MB";
    let batch = parse_samples(data, "run-1", START);
    assert_eq!(batch.samples.len(), 2);
    assert_eq!(batch.skipped_lines, 1);
}

#[test]
fn unparseable_heap_skips_the_line() {
    let batch = parse_samples("00:00:01 | 1 | Gradle | lots | 2MB | 3MB", "run-1", START);
    assert!(batch.samples.is_empty());
    assert_eq!(batch.skipped_lines, 1);
}

#[test]
fn malformed_elapsed_time_skips_the_line() {
    for line in [
        "xx:00:01 | 1 | Gradle | 1MB | 2MB | 3MB",
        "00:01 | 1 | Gradle | 1MB | 2MB | 3MB",
        "00:00:00:01 | 1 | Gradle | 1MB | 2MB | 3MB",
    ] {
        let batch = parse_samples(line, "run-1", START);
        assert!(batch.samples.is_empty(), "line should skip: {line}");
        assert_eq!(batch.skipped_lines, 1);
    }
}

#[test]
fn empty_lines_are_ignored_silently() {
    let batch = parse_samples("\n\n  \n00:00:01 | 1 | Gradle | 1MB | 2MB | 3MB\n\n", "run-1", START);
    assert_eq!(batch.samples.len(), 1);
    assert_eq!(batch.skipped_lines, 0);
}

#[test]
fn empty_payload_yields_empty_batch() {
    let batch = parse_samples("", "run-1", START);
    assert!(batch.samples.is_empty());
    assert_eq!(batch.skipped_lines, 0);
}

// ============================================================================
// SECTION: Property Tests
// ============================================================================

proptest! {
    #[test]
    fn elapsed_arithmetic_holds_for_any_clock_reading(
        hours in 0u64..100,
        minutes in 0u64..60,
        seconds in 0u64..60,
        heap in 0u64..100_000,
    ) {
        let line = format!("{hours:02}:{minutes:02}:{seconds:02} | 7 | Gradle | {heap}MB | {heap}MB | {heap}MB");
        let batch = parse_samples(&line, "run-p", START);
        let expected = hours * 3_600 + minutes * 60 + seconds;
        assert_eq!(batch.samples.len(), 1);
        assert_eq!(batch.samples[0].elapsed_seconds, expected);
        assert_eq!(
            batch.samples[0].timestamp,
            START + i64::try_from(expected).unwrap() * 1_000
        );
    }
}
