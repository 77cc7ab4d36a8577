//! SQLite-backed conversation store.
//!
//! Queries run on the blocking thread pool with a connection taken from the
//! shared r2d2 pool.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use warden_core::{ConversationId, ConversationTurn, Role};
use warden_store::ConnectionPool;

use crate::errors::MemoryError;
use crate::store::{ConversationState, ConversationStore, DEFAULT_MAX_TURNS};

/// Durable conversation store.
///
/// Turns are numbered per conversation by `seq`; rows older than the
/// retention window are deleted in the same transaction as the append.
#[derive(Clone, Debug)]
pub struct SqliteConversationStore {
    pool: ConnectionPool,
    max_turns: usize,
}

impl SqliteConversationStore {
    /// Store over an already-migrated pool with the default retention window.
    pub fn new(pool: ConnectionPool) -> Self {
        Self::with_max_turns(pool, DEFAULT_MAX_TURNS)
    }

    /// Store retaining at most `max_turns` turns per conversation.
    pub fn with_max_turns(pool: ConnectionPool, max_turns: usize) -> Self {
        Self {
            pool,
            max_turns: max_turns.max(1),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

fn read_state(conn: &Connection, id: &ConversationId) -> Result<ConversationState, MemoryError> {
    let header: Option<(String, i64)> = conn
        .query_row(
            "SELECT summary, turn_count FROM conversations WHERE id = ?1",
            [id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((summary, turn_count)) = header else {
        return Ok(ConversationState::default());
    };

    let mut stmt = conn.prepare(
        "SELECT role, content, timestamp FROM conversation_turns
         WHERE conversation_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map([id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut turns = Vec::new();
    for row in rows {
        let (role, content, timestamp) = row?;
        let role: Role = role.parse().map_err(|message| MemoryError::Corrupt {
            conversation_id: id.to_string(),
            message,
        })?;
        turns.push(ConversationTurn {
            role,
            content,
            timestamp,
        });
    }

    Ok(ConversationState {
        turns,
        summary,
        turn_count: turn_count.max(0) as u64,
    })
}

/// Append `turns` in one transaction and return the new `turn_count`.
fn append_turns(
    conn: &Connection,
    id: &ConversationId,
    turns: &[ConversationTurn],
    max_turns: usize,
) -> Result<u64, MemoryError> {
    let tx = conn.unchecked_transaction()?;
    let _ = tx.execute(
        "INSERT INTO conversations (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
        [id.as_str()],
    )?;

    let mut turn_count = 0i64;
    for turn in turns {
        turn_count = tx.query_row(
            "UPDATE conversations SET turn_count = turn_count + 1 WHERE id = ?1
             RETURNING turn_count",
            [id.as_str()],
            |row| row.get(0),
        )?;
        let _ = tx.execute(
            "INSERT INTO conversation_turns (conversation_id, seq, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), turn_count, turn.role.as_str(), turn.content, turn.timestamp],
        )?;
    }

    let trimmed = tx.execute(
        "DELETE FROM conversation_turns WHERE conversation_id = ?1 AND seq <= ?2",
        params![id.as_str(), turn_count - max_turns as i64],
    )?;
    tx.commit()?;

    if trimmed > 0 {
        debug!(conversation_id = %id, trimmed, "trimmed retained turns");
    }
    Ok(turn_count as u64)
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_state(&self, id: &ConversationId) -> Result<ConversationState, MemoryError> {
        let id = id.clone();
        self.with_conn(move |conn| read_state(conn, &id)).await
    }

    async fn append_turn(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
    ) -> Result<u64, MemoryError> {
        let (id, max_turns) = (id.clone(), self.max_turns);
        self.with_conn(move |conn| append_turns(conn, &id, &[turn], max_turns))
            .await
    }

    async fn append_exchange(
        &self,
        id: &ConversationId,
        user: ConversationTurn,
        assistant: ConversationTurn,
    ) -> Result<u64, MemoryError> {
        let (id, max_turns) = (id.clone(), self.max_turns);
        self.with_conn(move |conn| append_turns(conn, &id, &[user, assistant], max_turns))
            .await
    }

    async fn set_summary(&self, id: &ConversationId, summary: &str) -> Result<(), MemoryError> {
        let (id, summary) = (id.clone(), summary.to_owned());
        self.with_conn(move |conn| {
            let _ = conn.execute(
                "INSERT INTO conversations (id, summary) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET summary = excluded.summary",
                params![id.as_str(), summary],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), MemoryError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let _ = conn.execute("DELETE FROM conversations WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
        .await
    }
}
