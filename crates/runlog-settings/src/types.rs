//! Settings type definitions.
//!
//! All types use camelCase field names and `#[serde(default)]`, so a partial
//! JSON file only needs the keys it changes.

use std::path::{Path, PathBuf};

use runlog_logging::{LogFormat, LogLevel};
use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "database": { "path": "/var/lib/runlog/runlog.db", "poolSize": 4 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunlogSettings {
    /// Database location and pool tuning.
    pub database: DatabaseSettings,
    /// Query defaults.
    pub query: QuerySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Database location and pool tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Database file. Relative paths resolve against the settings directory.
    pub path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// How long a writer waits on the database lock.
    pub busy_timeout_ms: u32,
    /// Page cache per connection.
    pub cache_size_kib: i64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "runlog.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

impl DatabaseSettings {
    /// Absolute database path, resolving a relative `path` against `base_dir`.
    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

/// Query defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Sessions returned by a listing when no limit is given.
    pub default_session_limit: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_session_limit: 25,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level; `RUST_LOG` overrides it.
    pub level: LogLevel,
    /// stderr line format.
    pub format: LogFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
