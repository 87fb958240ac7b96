// crates/heapwatch-config/src/lib.rs
// ============================================================================
// Module: Heapwatch Configuration Library
// Description: Environment-backed configuration for the Heapwatch backend.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! All runtime tunables — secrets, bind address, store selection, sweep
//! intervals and thresholds — are plain environment values parsed once at
//! startup into an explicit [`HeapwatchConfig`] object that is passed by
//! reference into the server. There is no process-wide mutable state.
//! Environment values are parsed with strict UTF-8 enforcement; invalid
//! values fail closed at startup.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::EnvKey;
pub use config::HeapwatchConfig;
pub use config::StoreKind;
