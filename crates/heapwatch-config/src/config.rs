// crates/heapwatch-config/src/config.rs
// ============================================================================
// Module: Heapwatch Environment Configuration
// Description: Typed env keys, strict readers, and the validated config.
// Purpose: Fail closed on misconfiguration before the server starts.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement and rejected
//! when empty or out of range. Secrets fall back to development defaults so
//! local runs work out of the box; the fallback is surfaced on the config
//! object so the server can emit a startup warning, mirroring how the
//! secrets must be rotated for any real deployment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address for the HTTP listener.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Development-only token signing secret.
const DEV_TOKEN_SECRET: &str = "heapwatch-dev-token-secret-change-me";
/// Development-only admin secret.
const DEV_ADMIN_SECRET: &str = "heapwatch-dev-admin-secret-change-me";
/// Default stale timeout: five minutes of inactivity.
const DEFAULT_STALE_TIMEOUT_SEC: u64 = 5 * 60;
/// Default stale sweep interval: two minutes.
const DEFAULT_STALE_SWEEP_INTERVAL_SEC: u64 = 2 * 60;
/// Default retention period: three hours.
const DEFAULT_RETENTION_PERIOD_SEC: u64 = 3 * 60 * 60;
/// Default retention sweep interval: thirty minutes.
const DEFAULT_RETENTION_SWEEP_INTERVAL_SEC: u64 = 30 * 60;
/// Default request body cap: 4 MiB.
const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Environment Keys
// ============================================================================

/// Environment keys consumed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    /// Token signing secret.
    TokenSecret,
    /// Shared admin secret for cleanup endpoints.
    AdminSecret,
    /// HTTP bind address.
    Bind,
    /// Store backend selection (`memory` or `sqlite`).
    Store,
    /// SQLite database file path.
    StorePath,
    /// Stale timeout in seconds.
    StaleTimeoutSec,
    /// Stale sweep interval in seconds.
    StaleSweepIntervalSec,
    /// Retention period in seconds.
    RetentionPeriodSec,
    /// Retention sweep interval in seconds.
    RetentionSweepIntervalSec,
    /// Maximum request body size in bytes.
    MaxBodyBytes,
}

impl EnvKey {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenSecret => "HEAPWATCH_TOKEN_SECRET",
            Self::AdminSecret => "HEAPWATCH_ADMIN_SECRET",
            Self::Bind => "HEAPWATCH_BIND",
            Self::Store => "HEAPWATCH_STORE",
            Self::StorePath => "HEAPWATCH_STORE_PATH",
            Self::StaleTimeoutSec => "HEAPWATCH_STALE_TIMEOUT_SEC",
            Self::StaleSweepIntervalSec => "HEAPWATCH_STALE_SWEEP_INTERVAL_SEC",
            Self::RetentionPeriodSec => "HEAPWATCH_RETENTION_PERIOD_SEC",
            Self::RetentionSweepIntervalSec => "HEAPWATCH_RETENTION_SWEEP_INTERVAL_SEC",
            Self::MaxBodyBytes => "HEAPWATCH_MAX_BODY_BYTES",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors; all fail process startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment value is not valid UTF-8.
    #[error("{0} must be valid UTF-8")]
    NotUtf8(&'static str),
    /// Environment value is set but empty or whitespace.
    #[error("{0} must not be empty")]
    Empty(&'static str),
    /// Environment value is not a positive integer.
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber {
        /// Offending environment variable name.
        key: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
    /// Store selector is not a known backend.
    #[error("{key} must be one of: memory, sqlite; got {value:?}")]
    InvalidStoreKind {
        /// Offending environment variable name.
        key: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
    /// SQLite store selected without a database path.
    #[error("sqlite store requires {0}")]
    MissingStorePath(&'static str),
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// In-memory store; data lost on restart.
    #[default]
    Memory,
    /// Durable SQLite store.
    Sqlite,
}

impl StoreKind {
    /// Returns a stable label for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Validated backend configuration assembled at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapwatchConfig {
    /// HTTP bind address.
    pub bind: String,
    /// Token signing secret.
    pub token_secret: String,
    /// Whether the token secret is the insecure development default.
    pub token_secret_is_default: bool,
    /// Shared admin secret.
    pub admin_secret: String,
    /// Whether the admin secret is the insecure development default.
    pub admin_secret_is_default: bool,
    /// Selected store backend.
    pub store: StoreKind,
    /// SQLite database path; required when `store` is [`StoreKind::Sqlite`].
    pub store_path: Option<PathBuf>,
    /// Inactivity window after which an unfinished run counts as stale.
    pub stale_timeout: Duration,
    /// Interval between background stale sweeps.
    pub stale_sweep_interval: Duration,
    /// Age beyond which run documents are deleted.
    pub retention_period: Duration,
    /// Interval between background retention sweeps.
    pub retention_sweep_interval: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for HeapwatchConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            token_secret: DEV_TOKEN_SECRET.to_string(),
            token_secret_is_default: true,
            admin_secret: DEV_ADMIN_SECRET.to_string(),
            admin_secret_is_default: true,
            store: StoreKind::Memory,
            store_path: None,
            stale_timeout: Duration::from_secs(DEFAULT_STALE_TIMEOUT_SEC),
            stale_sweep_interval: Duration::from_secs(DEFAULT_STALE_SWEEP_INTERVAL_SEC),
            retention_period: Duration::from_secs(DEFAULT_RETENTION_PERIOD_SEC),
            retention_sweep_interval: Duration::from_secs(DEFAULT_RETENTION_SWEEP_INTERVAL_SEC),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl HeapwatchConfig {
    /// Loads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is not valid UTF-8, is empty, or
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var_os(name))
    }

    /// Loads configuration through an explicit lookup function. Tests use
    /// this to avoid mutating process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is not valid UTF-8, is empty, or
    /// fails validation.
    pub fn from_lookup(
        lookup: &dyn Fn(&str) -> Option<OsString>,
    ) -> Result<Self, ConfigError> {
        let bind = read_nonempty(lookup, EnvKey::Bind)?.unwrap_or_else(|| DEFAULT_BIND.to_string());
        let (token_secret, token_secret_is_default) =
            secret_or_default(lookup, EnvKey::TokenSecret, DEV_TOKEN_SECRET)?;
        let (admin_secret, admin_secret_is_default) =
            secret_or_default(lookup, EnvKey::AdminSecret, DEV_ADMIN_SECRET)?;
        let store = match read_nonempty(lookup, EnvKey::Store)? {
            None => StoreKind::Memory,
            Some(value) => parse_store_kind(EnvKey::Store, &value)?,
        };
        let store_path = read_nonempty(lookup, EnvKey::StorePath)?.map(PathBuf::from);
        let stale_timeout =
            read_seconds(lookup, EnvKey::StaleTimeoutSec, DEFAULT_STALE_TIMEOUT_SEC)?;
        let stale_sweep_interval = read_seconds(
            lookup,
            EnvKey::StaleSweepIntervalSec,
            DEFAULT_STALE_SWEEP_INTERVAL_SEC,
        )?;
        let retention_period =
            read_seconds(lookup, EnvKey::RetentionPeriodSec, DEFAULT_RETENTION_PERIOD_SEC)?;
        let retention_sweep_interval = read_seconds(
            lookup,
            EnvKey::RetentionSweepIntervalSec,
            DEFAULT_RETENTION_SWEEP_INTERVAL_SEC,
        )?;
        let max_body_bytes = match read_nonempty(lookup, EnvKey::MaxBodyBytes)? {
            None => DEFAULT_MAX_BODY_BYTES,
            Some(value) => parse_positive::<usize>(EnvKey::MaxBodyBytes, &value)?,
        };
        let config = Self {
            bind,
            token_secret,
            token_secret_is_default,
            admin_secret,
            admin_secret_is_default,
            store,
            store_path,
            stale_timeout,
            stale_sweep_interval,
            retention_period,
            retention_sweep_interval,
            max_body_bytes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingStorePath`] when the SQLite store is
    /// selected without a path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store == StoreKind::Sqlite && self.store_path.is_none() {
            return Err(ConfigError::MissingStorePath(EnvKey::StorePath.as_str()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment value, enforcing UTF-8 and rejecting empty strings.
fn read_nonempty(
    lookup: &dyn Fn(&str) -> Option<OsString>,
    key: EnvKey,
) -> Result<Option<String>, ConfigError> {
    let Some(raw) = lookup(key.as_str()) else {
        return Ok(None);
    };
    let value = raw.into_string().map_err(|_| ConfigError::NotUtf8(key.as_str()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(key.as_str()));
    }
    Ok(Some(value))
}

/// Reads a secret, falling back to the development default when unset.
fn secret_or_default(
    lookup: &dyn Fn(&str) -> Option<OsString>,
    key: EnvKey,
    dev_default: &str,
) -> Result<(String, bool), ConfigError> {
    read_nonempty(lookup, key)?.map_or_else(
        || Ok((dev_default.to_string(), true)),
        |value| Ok((value, false)),
    )
}

/// Reads a positive seconds value with a default, as a [`Duration`].
fn read_seconds(
    lookup: &dyn Fn(&str) -> Option<OsString>,
    key: EnvKey,
    default_seconds: u64,
) -> Result<Duration, ConfigError> {
    match read_nonempty(lookup, key)? {
        None => Ok(Duration::from_secs(default_seconds)),
        Some(value) => parse_positive::<u64>(key, &value).map(Duration::from_secs),
    }
}

/// Parses a strictly positive integer.
fn parse_positive<T>(key: EnvKey, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed: T = value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.as_str(),
        value: value.to_string(),
    })?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidNumber {
            key: key.as_str(),
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

/// Parses the store backend selector.
fn parse_store_kind(key: EnvKey, value: &str) -> Result<StoreKind, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(StoreKind::Memory),
        "sqlite" => Ok(StoreKind::Sqlite),
        _ => Err(ConfigError::InvalidStoreKind {
            key: key.as_str(),
            value: value.to_string(),
        }),
    }
}
