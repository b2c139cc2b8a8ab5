//! Persistence for chat transcripts and pending owner requests.
//!
//! The orchestrator and tools depend on the [`ChatStore`] and
//! [`PendingReplyStore`] traits; [`SqliteStorage`] implements both on a
//! single SQLite database.

mod pending;
mod schema;
mod sqlite;

use async_trait::async_trait;

pub use pending::{PendingRequest, PendingStatus};
pub use sqlite::SqliteStorage;

use crate::agent::message::ConversationTurn;
use crate::error::StorageError;

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".chatbridge/chatbridge.db";

/// Conversation transcript store keyed by session id.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Replaces the stored transcript of `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    async fn save(&self, session_id: &str, turns: &[ConversationTurn]) -> Result<(), StorageError>;

    /// Loads the transcript of `session_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the read fails or the stored JSON is
    /// malformed.
    async fn load(&self, session_id: &str) -> Result<Option<Vec<ConversationTurn>>, StorageError>;
}

/// Store of requests sent to the owner and their replies.
#[async_trait]
pub trait PendingReplyStore: Send + Sync {
    /// Records a request that is about to be sent.
    async fn create_pending(
        &self,
        session_id: &str,
        tool_use_id: &str,
        message: &str,
        context: Option<serde_json::Value>,
    ) -> Result<PendingRequest, StorageError>;

    /// Most recent reply recorded for `session_id` that has not been
    /// consumed yet.
    async fn check_reply(&self, session_id: &str) -> Result<Option<String>, StorageError>;

    /// Resets replied records of `session_id` to pending so the next reply
    /// can be observed.
    async fn clear_reply(&self, session_id: &str) -> Result<(), StorageError>;

    /// Marks the pending records of `session_id` as timed out.
    async fn mark_timed_out(&self, session_id: &str) -> Result<(), StorageError>;

    /// Closes the pending records of `session_id` after a wait that ended
    /// with a reply.
    async fn mark_closed(&self, session_id: &str) -> Result<(), StorageError>;

    /// Most recent pending record of `session_id`.
    async fn pending_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<PendingRequest>, StorageError>;

    /// Most recent pending record across all sessions.
    async fn most_recent_pending(&self) -> Result<Option<PendingRequest>, StorageError>;

    /// Stores `reply` on the pending record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no pending record has that id.
    async fn record_reply(&self, id: &str, reply: &str) -> Result<PendingRequest, StorageError>;
}
