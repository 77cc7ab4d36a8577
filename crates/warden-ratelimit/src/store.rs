//! Rate state storage port and adapters.

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::OptionalExtension;
use warden_core::ClientIdentity;
use warden_store::ConnectionPool;

use crate::errors::RateLimitError;
use crate::state::RateWindowState;

/// Keyed storage for rate window state.
///
/// The admission controller serializes access per identity, so adapters only
/// need per-call atomicity.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Load state for `identity`; unknown identities yield empty state.
    async fn load(&self, identity: &ClientIdentity) -> Result<RateWindowState, RateLimitError>;

    /// Replace state for `identity`.
    async fn save(
        &self,
        identity: &ClientIdentity,
        state: &RateWindowState,
        now_ms: i64,
    ) -> Result<(), RateLimitError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local store backed by a sharded map.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    map: DashMap<ClientIdentity, RateWindowState>,
}

impl MemoryRateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no identity is tracked.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn load(&self, identity: &ClientIdentity) -> Result<RateWindowState, RateLimitError> {
        Ok(self
            .map
            .get(identity)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        identity: &ClientIdentity,
        state: &RateWindowState,
        _now_ms: i64,
    ) -> Result<(), RateLimitError> {
        let _ = self.map.insert(identity.clone(), state.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// Durable store: one `rate_windows` row per identity with the three lists
/// as JSON arrays.
#[derive(Clone, Debug)]
pub struct SqliteRateStore {
    pool: ConnectionPool,
}

impl SqliteRateStore {
    /// Store over an already-migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Run `f` against a pooled connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, RateLimitError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, RateLimitError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

fn decode(identity: &str, raw: &str) -> Result<Vec<i64>, RateLimitError> {
    serde_json::from_str(raw).map_err(|source| RateLimitError::Corrupt {
        identity: identity.to_owned(),
        source,
    })
}

fn encode(list: &[i64]) -> Result<String, RateLimitError> {
    serde_json::to_string(list).map_err(|e| RateLimitError::Store(e.into()))
}

#[async_trait]
impl RateStore for SqliteRateStore {
    async fn load(&self, identity: &ClientIdentity) -> Result<RateWindowState, RateLimitError> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT minute, hour, day FROM rate_windows WHERE identity = ?1",
                    [identity.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((minute, hour, day)) = row else {
                return Ok(RateWindowState::default());
            };
            Ok(RateWindowState {
                minute: decode(&identity, &minute)?,
                hour: decode(&identity, &hour)?,
                day: decode(&identity, &day)?,
            })
        })
        .await
    }

    async fn save(
        &self,
        identity: &ClientIdentity,
        state: &RateWindowState,
        now_ms: i64,
    ) -> Result<(), RateLimitError> {
        let identity = identity.to_string();
        let (minute, hour, day) = (
            encode(&state.minute)?,
            encode(&state.hour)?,
            encode(&state.day)?,
        );
        self.with_conn(move |conn| {
            let _ = conn.execute(
                "INSERT INTO rate_windows (identity, minute, hour, day, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identity) DO UPDATE SET
                   minute = excluded.minute,
                   hour = excluded.hour,
                   day = excluded.day,
                   updated_at = excluded.updated_at",
                rusqlite::params![identity, minute, hour, day, now_ms],
            )?;
            Ok(())
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use warden_store::{ConnectionConfig, open_pool};

    use super::*;

    fn sample() -> RateWindowState {
        RateWindowState {
            minute: vec![3],
            hour: vec![2, 3],
            day: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn memory_unknown_identity_is_empty() {
        let store = MemoryRateStore::new();
        let state = store.load(&ClientIdentity::from_raw("x")).await.unwrap();
        assert_eq!(state, RateWindowState::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_save_then_load() {
        let store = MemoryRateStore::new();
        let id = ClientIdentity::from_raw("198.51.100.4");
        store.save(&id, &sample(), 3).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), sample());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sqlite_save_then_load() {
        let pool = open_pool(None, &ConnectionConfig::default()).unwrap();
        let store = SqliteRateStore::new(pool);
        let id = ClientIdentity::from_raw("198.51.100.4");

        assert_eq!(store.load(&id).await.unwrap(), RateWindowState::default());
        store.save(&id, &sample(), 3).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), sample());

        let mut next = sample();
        next.minute.clear();
        store.save(&id, &next, 4).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), next);
    }

    #[tokio::test]
    async fn sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate.db");
        let id = ClientIdentity::from_raw("203.0.113.9");
        {
            let pool = open_pool(Some(&path), &ConnectionConfig::default()).unwrap();
            SqliteRateStore::new(pool).save(&id, &sample(), 3).await.unwrap();
        }
        let pool = open_pool(Some(&path), &ConnectionConfig::default()).unwrap();
        assert_eq!(SqliteRateStore::new(pool).load(&id).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn sqlite_corrupt_row_is_error() {
        let pool = open_pool(None, &ConnectionConfig::default()).unwrap();
        let _ = pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO rate_windows (identity, minute, hour, day) VALUES ('bad', 'x', '[]', '[]')",
                [],
            )
            .unwrap();
        let store = SqliteRateStore::new(pool);
        let err = store.load(&ClientIdentity::from_raw("bad")).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn sqlite_waits_for_connection_off_the_runtime() {
        // In-memory pools hold a single connection.
        let pool = open_pool(None, &ConnectionConfig::default()).unwrap();
        let store = SqliteRateStore::new(pool.clone());
        let held = pool.get().unwrap();

        let pending = tokio::spawn(async move {
            store.load(&ClientIdentity::from_raw("198.51.100.4")).await
        });
        let started = std::time::Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        drop(held);
        assert_eq!(pending.await.unwrap().unwrap(), RateWindowState::default());
    }
}
