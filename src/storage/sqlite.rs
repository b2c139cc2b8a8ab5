//! `SQLite` implementation of the chat and pending-reply stores.
//!
//! The connection sits behind a mutex; async callers run their queries on
//! the blocking pool via `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use super::pending::{PendingRequest, PendingStatus};
use super::schema::{SCHEMA_SQL, SCHEMA_VERSION};
use super::{ChatStore, PendingReplyStore};
use crate::agent::message::ConversationTurn;
use crate::error::StorageError;

const PENDING_COLUMNS: &str = "id, session_id, tool_use_id, message_to_owner, owner_reply, \
     status, created_at, replied_at, conversation_context";

/// `SQLite`-backed storage.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if `SQLite` cannot allocate it.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Creates the schema. Safe to call on an initialized database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if a statement fails.
    pub fn init(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        })
    }

    /// Returns `true` once [`SqliteStorage::init`] has run.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the catalog query fails.
    pub fn is_initialized(&self) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            let tables: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'table' AND name IN ('chats', 'pending_sms')",
                [],
                |row| row.get(0),
            )?;
            Ok(tables == 2)
        })
    }

    /// Loads a transcript synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the read fails or the JSON is malformed.
    pub fn load_chat(&self, session_id: &str) -> Result<Option<Vec<ConversationTurn>>, StorageError> {
        self.with_conn(|conn| load_chat(conn, session_id))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn load_chat(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<Vec<ConversationTurn>>, StorageError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT messages FROM chats WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(StorageError::from)
}

fn row_to_pending(row: &Row<'_>) -> rusqlite::Result<PendingRequest> {
    let status: String = row.get(5)?;
    let context: Option<String> = row.get(8)?;
    Ok(PendingRequest {
        id: row.get(0)?,
        session_id: row.get(1)?,
        tool_use_id: row.get(2)?,
        message_sent: row.get(3)?,
        reply: row.get(4)?,
        status: PendingStatus::parse(&status),
        created_at: row.get(6)?,
        replied_at: row.get(7)?,
        context: context.and_then(|c| serde_json::from_str(&c).ok()),
    })
}

#[async_trait]
impl ChatStore for SqliteStorage {
    async fn save(&self, session_id: &str, turns: &[ConversationTurn]) -> Result<(), StorageError> {
        let session_id = session_id.to_string();
        let messages = serde_json::to_string(turns)?;
        let count = turns.len();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO chats (session_id, messages, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(session_id) DO UPDATE SET \
                 messages = excluded.messages, updated_at = excluded.updated_at",
                params![session_id, messages, now()],
            )?;
            debug!(session_id, turns = count, "chat saved");
            Ok(())
        })
        .await
    }

    async fn load(&self, session_id: &str) -> Result<Option<Vec<ConversationTurn>>, StorageError> {
        let session_id = session_id.to_string();
        self.run(move |conn| load_chat(conn, &session_id)).await
    }
}

#[async_trait]
impl PendingReplyStore for SqliteStorage {
    async fn create_pending(
        &self,
        session_id: &str,
        tool_use_id: &str,
        message: &str,
        context: Option<serde_json::Value>,
    ) -> Result<PendingRequest, StorageError> {
        let record = PendingRequest {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            tool_use_id: tool_use_id.to_string(),
            message_sent: message.to_string(),
            reply: None,
            status: PendingStatus::Pending,
            created_at: now(),
            replied_at: None,
            context,
        };
        let context_json = record
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO pending_sms \
                 (id, session_id, tool_use_id, message_to_owner, status, created_at, conversation_context) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.session_id,
                    record.tool_use_id,
                    record.message_sent,
                    record.status.as_str(),
                    record.created_at,
                    context_json,
                ],
            )?;
            debug!(id = record.id, session_id = record.session_id, "pending request created");
            Ok(record)
        })
        .await
    }

    async fn check_reply(&self, session_id: &str) -> Result<Option<String>, StorageError> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            let reply: Option<Option<String>> = conn
                .query_row(
                    "SELECT owner_reply FROM pending_sms \
                     WHERE session_id = ?1 AND status = 'replied' \
                     ORDER BY replied_at DESC, rowid DESC LIMIT 1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(reply.flatten())
        })
        .await
    }

    async fn clear_reply(&self, session_id: &str) -> Result<(), StorageError> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "UPDATE pending_sms SET owner_reply = NULL, replied_at = NULL, status = 'pending' \
                 WHERE session_id = ?1 AND status = 'replied'",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn mark_timed_out(&self, session_id: &str) -> Result<(), StorageError> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE pending_sms SET status = 'timed_out' \
                 WHERE session_id = ?1 AND status = 'pending'",
                params![session_id],
            )?;
            debug!(session_id, changed, "pending requests timed out");
            Ok(())
        })
        .await
    }

    async fn mark_closed(&self, session_id: &str) -> Result<(), StorageError> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE pending_sms SET status = 'closed' \
                 WHERE session_id = ?1 AND status = 'pending'",
                params![session_id],
            )?;
            debug!(session_id, changed, "pending requests closed");
            Ok(())
        })
        .await
    }

    async fn pending_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PendingRequest>, StorageError> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {PENDING_COLUMNS} FROM pending_sms \
                 WHERE session_id = ?1 AND status = 'pending' \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            );
            Ok(conn
                .query_row(&sql, params![session_id], row_to_pending)
                .optional()?)
        })
        .await
    }

    async fn most_recent_pending(&self) -> Result<Option<PendingRequest>, StorageError> {
        self.run(|conn| {
            let sql = format!(
                "SELECT {PENDING_COLUMNS} FROM pending_sms \
                 WHERE status = 'pending' \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            );
            Ok(conn.query_row(&sql, [], row_to_pending).optional()?)
        })
        .await
    }

    async fn record_reply(&self, id: &str, reply: &str) -> Result<PendingRequest, StorageError> {
        let id = id.to_string();
        let reply = reply.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE pending_sms SET owner_reply = ?2, status = 'replied', replied_at = ?3 \
                 WHERE id = ?1 AND status = 'pending'",
                params![id, reply, now()],
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound {
                    entity: "pending request",
                    id,
                });
            }
            let sql = format!("SELECT {PENDING_COLUMNS} FROM pending_sms WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], row_to_pending)?)
        })
        .await
    }
}
