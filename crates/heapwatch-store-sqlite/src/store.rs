// crates/heapwatch-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Run Store
// Description: Durable RunStore keeping one JSON document per run.
// Purpose: Persist run documents with range-queryable update stamps.
// Dependencies: heapwatch-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each run document is stored as serde_json text in a single row, with the
//! canonical `updated_at_timestamp` and the `finished` flag mirrored into
//! dedicated columns. Every mutating operation runs its read-modify-write
//! inside one transaction on a mutex-guarded connection, so concurrent
//! writers to the same run serialize instead of losing appends. The stale
//! scan and the retention sweep only use equality and range predicates on
//! the mirrored columns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use heapwatch_core::ProcessInfo;
use heapwatch_core::Run;
use heapwatch_core::RunStore;
use heapwatch_core::Sample;
use heapwatch_core::StoreError;
use heapwatch_core::clock;
use heapwatch_core::store::duration_millis;
use heapwatch_core::store::validate_sample_ownership;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` run store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config with default pragmas for the given database path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored document is corrupt or inconsistent.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::VersionMismatch(message) => Self::Store(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed run store.
#[derive(Clone)]
pub struct SqliteRunStore {
    /// Shared `SQLite` connection guarded by a mutex; each store operation
    /// holds the guard for its whole transaction.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Opens an `SQLite`-backed run store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs `body` inside one transaction on the guarded connection.
    fn with_transaction<T>(
        &self,
        body: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let value = body(&tx)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(value)
    }
}

impl RunStore for SqliteRunStore {
    fn get_run(&self, run_id: &str) -> Result<Run, StoreError> {
        let row = self
            .with_transaction(|tx| load_run(tx, run_id))
            .map_err(StoreError::from)?;
        row.ok_or_else(|| StoreError::NotFound(run_id.to_string()))
    }

    fn store_samples(&self, run_id: &str, samples: Vec<Sample>) -> Result<(), StoreError> {
        validate_sample_ownership(run_id, &samples)?;
        let now = clock::unix_millis_now();
        self.with_transaction(|tx| {
            let mut run = load_run(tx, run_id)?.unwrap_or_else(|| Run::new(run_id, now));
            run.samples.extend(samples);
            run.touch(now);
            write_run(tx, &run)
        })
        .map_err(StoreError::from)
    }

    fn store_process_info(&self, run_id: &str, info: ProcessInfo) -> Result<(), StoreError> {
        let now = clock::unix_millis_now();
        self.with_transaction(|tx| {
            let mut run = load_run(tx, run_id)?.unwrap_or_else(|| Run::new(run_id, now));
            run.process_info.insert(info.pid.clone(), info);
            run.touch(now);
            write_run(tx, &run)
        })
        .map_err(StoreError::from)
    }

    fn mark_run_finished(&self, run_id: &str) -> Result<(), StoreError> {
        let now = clock::unix_millis_now();
        let found = self
            .with_transaction(|tx| {
                let Some(mut run) = load_run(tx, run_id)? else {
                    return Ok(false);
                };
                if run.finish(now) {
                    write_run(tx, &run)?;
                }
                Ok(true)
            })
            .map_err(StoreError::from)?;
        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound(run_id.to_string()))
        }
    }

    fn find_stale_runs(&self, timeout: Duration) -> Result<Vec<String>, StoreError> {
        let cutoff = clock::unix_millis_now().saturating_sub(duration_millis(timeout));
        self.with_transaction(|tx| {
            let mut statement = tx
                .prepare(
                    "SELECT run_id FROM runs WHERE finished = 0 AND updated_at_ms < ?1 ORDER BY \
                     run_id",
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let ids = statement
                .query_map(params![cutoff], |row| row.get::<_, String>(0))
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect::<Result<Vec<String>, _>>()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(ids)
        })
        .map_err(StoreError::from)
    }

    fn delete_old_runs(&self, retention: Duration) -> Result<Vec<String>, StoreError> {
        let cutoff = clock::unix_millis_now().saturating_sub(duration_millis(retention));
        self.with_transaction(|tx| {
            let mut statement = tx
                .prepare("SELECT run_id FROM runs WHERE updated_at_ms < ?1 ORDER BY run_id")
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let doomed = statement
                .query_map(params![cutoff], |row| row.get::<_, String>(0))
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect::<Result<Vec<String>, _>>()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            drop(statement);
            let mut deleted = Vec::with_capacity(doomed.len());
            for run_id in doomed {
                // Continue-on-error: report what was actually removed.
                if tx.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id]).is_ok() {
                    deleted.push(run_id);
                }
            }
            Ok(deleted)
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Loads and decodes one run document inside a transaction.
fn load_run(tx: &Transaction<'_>, run_id: &str) -> Result<Option<Run>, SqliteStoreError> {
    let doc: Option<String> = tx
        .query_row("SELECT doc FROM runs WHERE run_id = ?1", params![run_id], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let Some(doc) = doc else {
        return Ok(None);
    };
    let run: Run =
        serde_json::from_str(&doc).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if run.id != run_id {
        return Err(SqliteStoreError::Invalid(
            "run_id mismatch between key and document".to_string(),
        ));
    }
    Ok(Some(run))
}

/// Encodes and upserts one run document with its mirrored columns.
fn write_run(tx: &Transaction<'_>, run: &Run) -> Result<(), SqliteStoreError> {
    let doc =
        serde_json::to_string(run).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    tx.execute(
        "INSERT INTO runs (run_id, doc, updated_at_ms, finished) VALUES (?1, ?2, ?3, ?4) ON \
         CONFLICT(run_id) DO UPDATE SET doc = excluded.doc, updated_at_ms = \
         excluded.updated_at_ms, finished = excluded.finished",
        params![run.id, doc, run.updated_at_timestamp, i64::from(run.finished)],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates an existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    doc TEXT NOT NULL,
                    updated_at_ms INTEGER NOT NULL,
                    finished INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_runs_updated_at_ms
                    ON runs (updated_at_ms);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
