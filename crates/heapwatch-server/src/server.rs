// crates/heapwatch-server/src/server.rs
// ============================================================================
// Module: Heapwatch Server Wiring
// Description: Router construction, store selection, and the serve loop.
// Purpose: Assemble config, store, handlers, and janitors into one process.
// Dependencies: heapwatch-config, heapwatch-core, heapwatch-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! Builds the shared [`AppState`] from configuration, wires the seven routes
//! with their preflights, spawns the janitor loops, and serves until ctrl-c.
//! The store backend is selected here so ingestion and janitor logic stay
//! backend-agnostic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::routing::post;
use heapwatch_config::HeapwatchConfig;
use heapwatch_config::StoreKind;
use heapwatch_core::AdminSecret;
use heapwatch_core::InMemoryRunStore;
use heapwatch_core::SharedRunStore;
use heapwatch_core::TokenService;
use heapwatch_store_sqlite::SqliteRunStore;
use heapwatch_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::StartupAuditEvent;
use crate::audit::StderrAuditSink;
use crate::handlers::AppState;
use crate::handlers::handle_auth_run;
use crate::handlers::handle_cleanup_old;
use crate::handlers::handle_cleanup_stale;
use crate::handlers::handle_finish_run;
use crate::handlers::handle_get_run;
use crate::handlers::handle_health;
use crate::handlers::handle_ingest;
use crate::handlers::handle_missing_run_id;
use crate::handlers::preflight_get;
use crate::handlers::preflight_post_admin;
use crate::handlers::preflight_post_bearer;
use crate::janitor::JanitorConfig;
use crate::janitor::spawn_janitors;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server assembly and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Builds the run store selected by configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the SQLite store cannot be opened or the
/// configuration is inconsistent.
pub fn build_run_store(config: &HeapwatchConfig) -> Result<SharedRunStore, ServerError> {
    let store = match config.store {
        StoreKind::Memory => SharedRunStore::from_store(InMemoryRunStore::new()),
        StoreKind::Sqlite => {
            let path = config
                .store_path
                .clone()
                .ok_or_else(|| ServerError::Config("sqlite store requires path".to_string()))?;
            let store = SqliteRunStore::new(&SqliteStoreConfig::with_path(path))
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedRunStore::from_store(store)
        }
    };
    Ok(store)
}

/// Builds the shared handler state from configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the store cannot be built.
pub fn build_app_state(
    config: &HeapwatchConfig,
    audit: Arc<dyn AuditSink>,
) -> Result<Arc<AppState>, ServerError> {
    config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
    let store = build_run_store(config)?;
    Ok(Arc::new(AppState {
        store,
        tokens: TokenService::new(config.token_secret.clone()),
        admin: AdminSecret::new(config.admin_secret.clone()),
        audit,
        stale_timeout: config.stale_timeout,
        retention_period: config.retention_period,
        max_body_bytes: config.max_body_bytes,
    }))
}

/// Builds the API router over the shared state.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(handle_health).options(preflight_get))
        .route("/auth/run/{id}", post(handle_auth_run).options(preflight_post_bearer))
        .route("/auth/run", post(handle_missing_run_id))
        .route("/ingest", post(handle_ingest).options(preflight_post_bearer))
        .route("/runs/{id}", get(handle_get_run).options(preflight_get))
        .route("/runs", get(handle_missing_run_id))
        .route("/finish/{id}", post(handle_finish_run).options(preflight_post_bearer))
        .route("/finish", post(handle_missing_run_id))
        .route("/cleanup/stale", post(handle_cleanup_stale).options(preflight_post_admin))
        .route("/cleanup/old", post(handle_cleanup_old).options(preflight_post_admin))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================================
// SECTION: Serve Loop
// ============================================================================

/// Runs the backend: binds the listener, spawns the janitors, serves until
/// ctrl-c, then stops the janitors.
///
/// # Errors
///
/// Returns [`ServerError`] when assembly, binding, or serving fails.
pub async fn serve(config: HeapwatchConfig) -> Result<(), ServerError> {
    let audit: Arc<dyn AuditSink> = Arc::new(StderrAuditSink);
    let state = build_app_state(&config, Arc::clone(&audit))?;
    audit.record_startup(&StartupAuditEvent::new(
        config.bind.clone(),
        config.store.as_str(),
        config.token_secret_is_default,
        config.admin_secret_is_default,
    ));
    let janitors = spawn_janitors(
        state.store.clone(),
        Arc::clone(&audit),
        JanitorConfig {
            stale_sweep_interval: config.stale_sweep_interval,
            stale_timeout: config.stale_timeout,
            retention_sweep_interval: config.retention_sweep_interval,
            retention_period: config.retention_period,
        },
    );
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|err| ServerError::Transport(format!("bind failed: {err}")))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ServerError::Transport(format!("server failed: {err}")));
    janitors.shutdown().await;
    served
}

/// Resolves when the process receives ctrl-c.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
