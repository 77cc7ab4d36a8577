//! `SQLite` connection pool with WAL mode.
//!
//! Every new connection runs [`PragmaCustomizer`] so journal mode, busy timeout
//! and foreign keys are consistent across the pool.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::errors::Result;
use crate::migrations::run_migrations;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool configuration.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 8). In-memory pools always use 1.
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 5000).
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
    }
}

/// Open a pool and bring the schema up to date.
///
/// `None` opens a single-connection in-memory database, so every caller of
/// the pool sees the same data.
pub fn open_pool(path: Option<&Path>, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let (manager, size) = match path {
        Some(p) => {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            (SqliteConnectionManager::file(p), config.pool_size)
        }
        None => (SqliteConnectionManager::memory(), 1),
    };

    let pool = Pool::builder()
        .max_size(size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
        .build(manager)?;

    let conn = pool.get()?;
    let applied = run_migrations(&conn)?;
    info!(
        path = path.map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
        pool_size = size,
        applied,
        "sqlite store ready"
    );
    Ok(pool)
}
