// crates/heapwatch-server/src/handlers.rs
// ============================================================================
// Module: Heapwatch HTTP Handlers
// Description: Route handlers, auth enforcement, and status mapping.
// Purpose: Bind run-lifecycle operations to the HTTP boundary.
// Dependencies: heapwatch-core, axum, serde, serde_json
// ============================================================================

//! ## Overview
//! Handlers are thin wrappers over `heapwatch-core`: they authenticate,
//! decode the wire format, route store work through a blocking-aware shim,
//! and map the error taxonomy onto status codes. Every auth rejection
//! collapses to 401 on the wire while the specific reason goes to the audit
//! sink. Responses carry a permissive CORS origin header; OPTIONS preflights
//! are answered per route.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS;
use axum::http::header::ACCESS_CONTROL_ALLOW_METHODS;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use heapwatch_core::AdminSecret;
use heapwatch_core::ProcessInfo;
use heapwatch_core::RunStore;
use heapwatch_core::Sample;
use heapwatch_core::SharedRunStore;
use heapwatch_core::StoreError;
use heapwatch_core::TokenService;
use heapwatch_core::clock;
use heapwatch_core::ingest;
use heapwatch_core::retention_sweep;
use heapwatch_core::stale_sweep;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::AuthDenyAuditEvent;
use crate::audit::IngestAuditEvent;
use crate::audit::RequestAuditEvent;
use crate::audit::SweepAuditEvent;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the shared admin secret.
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Immutable state shared by all handlers and the janitors.
pub struct AppState {
    /// Run document store.
    pub store: SharedRunStore,
    /// Run-scoped token issuer/validator.
    pub tokens: TokenService,
    /// Shared admin secret for cleanup endpoints.
    pub admin: AdminSecret,
    /// Audit sink for structured events.
    pub audit: Arc<dyn AuditSink>,
    /// Inactivity window used by the synchronous stale sweep.
    pub stale_timeout: Duration,
    /// Retention cutoff used by the synchronous retention sweep.
    pub retention_period: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// API-boundary error taxonomy mapped onto status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request data.
    #[error("{0}")]
    BadRequest(String),
    /// Authentication failure; the precise reason lives in the audit log.
    #[error("{0}")]
    Unauthorized(String),
    /// Direct lookup of a run that does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Request body exceeded the configured cap.
    #[error("request body too large")]
    PayloadTooLarge,
    /// Storage or serialization failure.
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the mapped HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(run_id) => Self::NotFound(format!("run {run_id} not found")),
            StoreError::Store(message) | StoreError::Invalid(message) => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], axum::Json(body)).into_response()
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Human-readable error message.
    error: String,
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Liveness response body.
#[derive(Debug, Serialize)]
struct HealthResponse {
    /// Fixed liveness label.
    status: &'static str,
}

/// Token issuance response body.
#[derive(Debug, Serialize)]
struct TokenResponse {
    /// Opaque bearer token.
    token: String,
    /// Expiry rendered as RFC 3339.
    expires_at: String,
}

/// Ingest request body.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Run the payload belongs to.
    pub run_id: String,
    /// Raw pipe-delimited sample lines.
    pub data: String,
    /// Optional static process metadata.
    #[serde(default)]
    pub process_info: Option<ProcessInfo>,
}

/// Ingest response body. The sample count is a string on the wire.
#[derive(Debug, Serialize)]
struct IngestResponse {
    /// Fixed success label.
    status: &'static str,
    /// Count of stored samples, stringified.
    samples: String,
}

/// Full run projection returned to the dashboard.
#[derive(Debug, Serialize)]
struct RunResponse {
    /// Stored samples in arrival order.
    samples: Vec<Sample>,
    /// Per-process metadata keyed by pid.
    process_info: BTreeMap<String, ProcessInfo>,
    /// Lifecycle flag.
    finished: bool,
    /// Finish transition time, RFC 3339, when finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<String>,
    /// Last mutation time, RFC 3339.
    updated_at: String,
}

/// Finish response body.
#[derive(Debug, Serialize)]
struct FinishResponse {
    /// Fixed success label.
    status: &'static str,
    /// Human-readable confirmation.
    message: String,
}

/// Admin stale-cleanup response body.
#[derive(Debug, Serialize)]
struct StaleCleanupResponse {
    /// Fixed success flag.
    success: bool,
    /// Runs the stale scan returned.
    total_checked: usize,
    /// Runs the stale scan returned (kept for dashboard compatibility).
    stale_found: usize,
    /// Runs successfully marked finished.
    cleaned_up: usize,
    /// Ids of the runs marked finished.
    cleaned_runs: Vec<String>,
}

/// Admin retention-cleanup response body.
#[derive(Debug, Serialize)]
struct RetentionCleanupResponse {
    /// Fixed success flag.
    success: bool,
    /// Count of deleted runs.
    deleted_count: usize,
    /// Ids of the deleted runs.
    deleted_runs: Vec<String>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /healthz` — liveness probe.
pub async fn handle_health() -> Response {
    json_ok(&HealthResponse {
        status: "healthy",
    })
}

/// `POST /auth/run/{id}` — issues a run-scoped bearer token.
pub async fn handle_auth_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let run_id = require_run_id(&run_id)?;
    let issued = state
        .tokens
        .generate(run_id)
        .map_err(|err| ApiError::Internal(format!("failed to generate token: {err}")))?;
    let response = json_ok(&TokenResponse {
        token: issued.token,
        expires_at: clock::to_rfc3339(issued.expires_at),
    });
    state.audit.record_request(&RequestAuditEvent::new(
        "/auth/run",
        "POST",
        StatusCode::OK.as_u16(),
        Some(run_id.to_string()),
    ));
    Ok(response)
}

/// `POST /ingest` — parses and stores a sample batch for a run.
pub async fn handle_ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.len() > state.max_body_bytes {
        return Err(ApiError::PayloadTooLarge);
    }
    let request: IngestRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;
    let token = bearer_token(&headers, &state, "/ingest", Some(&request.run_id))?;
    if let Err(err) = state.tokens.validate(&token, &request.run_id) {
        state.audit.record_auth_deny(&AuthDenyAuditEvent::new(
            "/ingest",
            err.to_string(),
            Some(request.run_id.clone()),
        ));
        return Err(ApiError::Unauthorized("token validation failed".to_string()));
    }
    if request.run_id.trim().is_empty() || request.data.is_empty() {
        return Err(ApiError::BadRequest("missing run_id or data".to_string()));
    }
    let report = run_blocking(|| {
        ingest(&state.store, &request.run_id, &request.data, request.process_info)
    })?;
    state.audit.record_ingest(&IngestAuditEvent::new(
        report.run_id.clone(),
        report.accepted,
        report.skipped_lines,
        report.process_info_stored,
    ));
    state.audit.record_request(&RequestAuditEvent::new(
        "/ingest",
        "POST",
        StatusCode::OK.as_u16(),
        Some(report.run_id.clone()),
    ));
    Ok(json_ok(&IngestResponse {
        status: "success",
        samples: report.accepted.to_string(),
    }))
}

/// `GET /runs/{id}` — returns the full run projection.
pub async fn handle_get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let run_id = require_run_id(&run_id)?;
    let run = run_blocking(|| state.store.get_run(run_id))?;
    let response = json_ok(&RunResponse {
        samples: run.samples,
        process_info: run.process_info,
        finished: run.finished,
        finished_at: run.finished_at.map(clock::to_rfc3339),
        updated_at: clock::to_rfc3339(run.updated_at),
    });
    state.audit.record_request(&RequestAuditEvent::new(
        "/runs",
        "GET",
        StatusCode::OK.as_u16(),
        Some(run_id.to_string()),
    ));
    Ok(response)
}

/// `POST /finish/{id}` — force-finishes a run (bearer scoped to `{id}`).
pub async fn handle_finish_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let run_id = require_run_id(&run_id)?;
    let token = bearer_token(&headers, &state, "/finish", Some(run_id))?;
    if let Err(err) = state.tokens.validate(&token, run_id) {
        state.audit.record_auth_deny(&AuthDenyAuditEvent::new(
            "/finish",
            err.to_string(),
            Some(run_id.to_string()),
        ));
        return Err(ApiError::Unauthorized("token validation failed".to_string()));
    }
    run_blocking(|| state.store.mark_run_finished(run_id))?;
    state.audit.record_request(&RequestAuditEvent::new(
        "/finish",
        "POST",
        StatusCode::OK.as_u16(),
        Some(run_id.to_string()),
    ));
    Ok(json_ok(&FinishResponse {
        status: "success",
        message: format!("Run {run_id} marked as finished"),
    }))
}

/// `POST /cleanup/stale` — synchronous stale sweep (admin secret).
pub async fn handle_cleanup_stale(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers, "/cleanup/stale")?;
    let report = run_blocking(|| stale_sweep(&state.store, state.stale_timeout)).map_err(|err| {
        state.audit.record_sweep(&SweepAuditEvent::new(
            "stale",
            "admin",
            0,
            0,
            Some(err.to_string()),
        ));
        ApiError::Internal(format!("error finding stale runs: {err}"))
    })?;
    state.audit.record_sweep(&SweepAuditEvent::new(
        "stale",
        "admin",
        report.stale_found.len(),
        report.failures.len(),
        None,
    ));
    Ok(json_ok(&StaleCleanupResponse {
        success: true,
        total_checked: report.stale_found.len(),
        stale_found: report.stale_found.len(),
        cleaned_up: report.cleaned_runs.len(),
        cleaned_runs: report.cleaned_runs,
    }))
}

/// `POST /cleanup/old` — synchronous retention sweep (admin secret).
pub async fn handle_cleanup_old(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers, "/cleanup/old")?;
    let report =
        run_blocking(|| retention_sweep(&state.store, state.retention_period)).map_err(|err| {
            state.audit.record_sweep(&SweepAuditEvent::new(
                "retention",
                "admin",
                0,
                0,
                Some(err.to_string()),
            ));
            ApiError::Internal(format!("error deleting old runs: {err}"))
        })?;
    state.audit.record_sweep(&SweepAuditEvent::new(
        "retention",
        "admin",
        report.deleted_runs.len(),
        0,
        None,
    ));
    Ok(json_ok(&RetentionCleanupResponse {
        success: true,
        deleted_count: report.deleted_runs.len(),
        deleted_runs: report.deleted_runs,
    }))
}

/// Shared 400 for run-scoped routes called without a run id.
pub async fn handle_missing_run_id() -> ApiError {
    ApiError::BadRequest("run id required".to_string())
}

// ============================================================================
// SECTION: CORS Preflight
// ============================================================================

/// Builds a permissive preflight response for the given method list.
fn preflight(methods: &'static str, allowed_headers: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (ACCESS_CONTROL_ALLOW_METHODS, methods),
            (ACCESS_CONTROL_ALLOW_HEADERS, allowed_headers),
        ],
    )
        .into_response()
}

/// `OPTIONS` preflight for plain GET routes.
pub async fn preflight_get() -> Response {
    preflight("GET, OPTIONS", "Content-Type")
}

/// `OPTIONS` preflight for POST routes carrying a bearer token.
pub async fn preflight_post_bearer() -> Response {
    preflight("POST, OPTIONS", "Content-Type, Authorization")
}

/// `OPTIONS` preflight for admin POST routes.
pub async fn preflight_post_admin() -> Response {
    preflight("POST, OPTIONS", "Content-Type, Authorization, X-Admin-Secret")
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects empty or whitespace run ids from path parameters.
fn require_run_id(run_id: &str) -> Result<&str, ApiError> {
    let trimmed = run_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("run id required".to_string()));
    }
    Ok(trimmed)
}

/// Extracts the bearer token from the Authorization header.
fn bearer_token(
    headers: &HeaderMap,
    state: &AppState,
    route: &'static str,
    run_id: Option<&str>,
) -> Result<String, ApiError> {
    let deny = |reason: &str| {
        state.audit.record_auth_deny(&AuthDenyAuditEvent::new(
            route,
            reason.to_string(),
            run_id.map(str::to_string),
        ));
        ApiError::Unauthorized(reason.to_string())
    };
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Err(deny("authorization header required"));
    };
    let Ok(header) = header.to_str() else {
        return Err(deny("invalid authorization header format"));
    };
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(deny("invalid authorization header format"));
    }
    Ok(token.to_string())
}

/// Enforces the admin secret header on cleanup routes.
fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    route: &'static str,
) -> Result<(), ApiError> {
    let provided = headers.get(ADMIN_SECRET_HEADER).and_then(|value| value.to_str().ok());
    match provided {
        Some(secret) if state.admin.matches(secret) => Ok(()),
        Some(_) => {
            state
                .audit
                .record_auth_deny(&AuthDenyAuditEvent::new(route, "admin secret mismatch", None));
            Err(ApiError::Unauthorized("unauthorized - admin secret required".to_string()))
        }
        None => {
            state
                .audit
                .record_auth_deny(&AuthDenyAuditEvent::new(route, "admin secret missing", None));
            Err(ApiError::Unauthorized("unauthorized - admin secret required".to_string()))
        }
    }
}

/// Serializes a 200 response with the permissive CORS origin header.
fn json_ok(body: &impl Serialize) -> Response {
    (StatusCode::OK, [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], axum::Json(
        serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
    ))
        .into_response()
}

/// Runs blocking store work, shifting off the async executor when the
/// multi-thread runtime is available.
pub(crate) fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}
