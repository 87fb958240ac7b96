// crates/heapwatch-server/src/audit.rs
// ============================================================================
// Module: Heapwatch Audit Logging
// Description: Structured audit events for request and janitor activity.
// Purpose: Emit JSON-line logs without hard logging dependencies.
// Dependencies: heapwatch-core, serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks for backend logging.
//! It is intentionally lightweight so deployments can route events to their
//! preferred logging pipeline without redesign; the default sink writes one
//! JSON object per line to stderr and sink failures are swallowed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use heapwatch_core::clock;
use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// One handled API request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (epoch millis).
    pub timestamp_ms: i64,
    /// Route label, e.g. `/ingest`.
    pub route: &'static str,
    /// HTTP method.
    pub method: &'static str,
    /// Response status code.
    pub status: u16,
    /// Run identifier when the route carries one.
    pub run_id: Option<String>,
}

impl RequestAuditEvent {
    /// Builds a request event stamped now.
    #[must_use]
    pub fn new(route: &'static str, method: &'static str, status: u16, run_id: Option<String>) -> Self {
        Self {
            event: "api_request",
            timestamp_ms: clock::unix_millis_now(),
            route,
            method,
            status,
            run_id,
        }
    }
}

/// One rejected authentication attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AuthDenyAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (epoch millis).
    pub timestamp_ms: i64,
    /// Route label the rejection happened on.
    pub route: &'static str,
    /// Stable rejection reason label (never secret material).
    pub reason: String,
    /// Run identifier when the route carries one.
    pub run_id: Option<String>,
}

impl AuthDenyAuditEvent {
    /// Builds an auth-deny event stamped now.
    #[must_use]
    pub fn new(route: &'static str, reason: impl Into<String>, run_id: Option<String>) -> Self {
        Self {
            event: "auth_deny",
            timestamp_ms: clock::unix_millis_now(),
            route,
            reason: reason.into(),
            run_id,
        }
    }
}

/// One completed ingest call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (epoch millis).
    pub timestamp_ms: i64,
    /// Run the batch was stored under.
    pub run_id: String,
    /// Samples parsed and stored.
    pub accepted: usize,
    /// Non-empty lines skipped as malformed.
    pub skipped_lines: usize,
    /// Outcome of the best-effort process-metadata write.
    pub process_info_stored: Option<bool>,
}

/// One completed janitor sweep, background or admin-triggered.
#[derive(Debug, Clone, Serialize)]
pub struct SweepAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (epoch millis).
    pub timestamp_ms: i64,
    /// Sweep kind: `stale` or `retention`.
    pub kind: &'static str,
    /// Whether the sweep ran from the background loop or an admin request.
    pub trigger: &'static str,
    /// Runs the scan returned (stale) or deleted (retention).
    pub affected: usize,
    /// Per-run failures the sweep skipped past.
    pub failures: usize,
    /// Scan-level error, when the sweep could not run at all.
    pub error: Option<String>,
}

/// Server startup summary.
#[derive(Debug, Clone, Serialize)]
pub struct StartupAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (epoch millis).
    pub timestamp_ms: i64,
    /// Bind address.
    pub bind: String,
    /// Store backend label.
    pub store: &'static str,
    /// True when the token secret is the insecure development default.
    pub token_secret_is_default: bool,
    /// True when the admin secret is the insecure development default.
    pub admin_secret_is_default: bool,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for backend events.
pub trait AuditSink: Send + Sync {
    /// Records a handled request.
    fn record_request(&self, event: &RequestAuditEvent);

    /// Records a rejected authentication attempt.
    fn record_auth_deny(&self, _event: &AuthDenyAuditEvent) {}

    /// Records a completed ingest call.
    fn record_ingest(&self, _event: &IngestAuditEvent) {}

    /// Records a completed janitor sweep.
    fn record_sweep(&self, _event: &SweepAuditEvent) {}

    /// Records the startup summary.
    fn record_startup(&self, _event: &StartupAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serializable event as a JSON line, swallowing failures.
    fn write_line(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_request(&self, event: &RequestAuditEvent) {
        Self::write_line(event);
    }

    fn record_auth_deny(&self, event: &AuthDenyAuditEvent) {
        Self::write_line(event);
    }

    fn record_ingest(&self, event: &IngestAuditEvent) {
        Self::write_line(event);
    }

    fn record_sweep(&self, event: &SweepAuditEvent) {
        Self::write_line(event);
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        Self::write_line(event);
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_request(&self, _event: &RequestAuditEvent) {}
}

// ============================================================================
// SECTION: Constructors
// ============================================================================

impl IngestAuditEvent {
    /// Builds an ingest event stamped now.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        accepted: usize,
        skipped_lines: usize,
        process_info_stored: Option<bool>,
    ) -> Self {
        Self {
            event: "ingest",
            timestamp_ms: clock::unix_millis_now(),
            run_id: run_id.into(),
            accepted,
            skipped_lines,
            process_info_stored,
        }
    }
}

impl SweepAuditEvent {
    /// Builds a sweep event stamped now.
    #[must_use]
    pub fn new(
        kind: &'static str,
        trigger: &'static str,
        affected: usize,
        failures: usize,
        error: Option<String>,
    ) -> Self {
        Self {
            event: "janitor_sweep",
            timestamp_ms: clock::unix_millis_now(),
            kind,
            trigger,
            affected,
            failures,
            error,
        }
    }
}

impl StartupAuditEvent {
    /// Builds a startup event stamped now.
    #[must_use]
    pub fn new(
        bind: impl Into<String>,
        store: &'static str,
        token_secret_is_default: bool,
        admin_secret_is_default: bool,
    ) -> Self {
        Self {
            event: "startup",
            timestamp_ms: clock::unix_millis_now(),
            bind: bind.into(),
            store,
            token_secret_is_default,
            admin_secret_is_default,
        }
    }
}
