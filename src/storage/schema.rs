//! `SQLite` schema.

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Tables and indexes. Every statement is idempotent.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS chats (
    session_id TEXT PRIMARY KEY,
    messages TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_sms (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    tool_use_id TEXT NOT NULL,
    message_to_owner TEXT NOT NULL,
    owner_reply TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    replied_at TEXT,
    conversation_context TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_sms_session ON pending_sms(session_id);
CREATE INDEX IF NOT EXISTS idx_pending_sms_status ON pending_sms(status) WHERE status = 'pending';
";
