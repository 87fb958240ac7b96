// crates/heapwatch-server/src/lib.rs
// ============================================================================
// Module: Heapwatch Server Library
// Description: HTTP API layer, audit logging, and background janitors.
// Purpose: Bind the run-lifecycle core to routes and timer loops.
// Dependencies: heapwatch-core, heapwatch-config, heapwatch-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! The server crate owns everything that touches a socket or a timer: the
//! axum router with its seven routes, bearer/admin authentication at the
//! HTTP boundary, permissive CORS, structured JSON audit logging through a
//! sink trait, and the two cancellable janitor loops. All run-lifecycle
//! semantics live in `heapwatch-core`; handlers and janitors are thin
//! wrappers over it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod handlers;
pub mod janitor;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::AuthDenyAuditEvent;
pub use audit::IngestAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::StartupAuditEvent;
pub use audit::StderrAuditSink;
pub use audit::SweepAuditEvent;
pub use handlers::AppState;
pub use janitor::JanitorConfig;
pub use janitor::JanitorHandle;
pub use janitor::spawn_janitors;
pub use server::ServerError;
pub use server::build_app_state;
pub use server::build_router;
pub use server::build_run_store;
pub use server::serve;
