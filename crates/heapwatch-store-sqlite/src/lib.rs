// crates/heapwatch-store-sqlite/src/lib.rs
// ============================================================================
// Module: Heapwatch SQLite Store Library
// Description: Public API surface for the SQLite run store.
// Purpose: Expose the durable RunStore implementation and its config.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! Durable [`heapwatch_core::RunStore`] backed by `SQLite`. Each run is one
//! JSON document row; the canonical update stamp and finished flag are
//! mirrored into indexed columns so the stale scan and the retention range
//! query never parse documents they do not return.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteRunStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
