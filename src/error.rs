//! Error types for chatbridge.
//!
//! Each layer owns a `thiserror` enum; [`Error`] wraps them for callers
//! that cross layers (CLI commands, server startup).

use thiserror::Error;

/// Result alias using the crate-wide [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent or provider failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// SMS transport failure.
    #[error(transparent)]
    Sms(#[from] SmsError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// HTTP server failure.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the agent layer: providers, tools and the orchestrator.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the selected provider.
    #[error("API key missing: set ANTHROPIC_API_KEY, OPENAI_API_KEY or CHATBRIDGE_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// The provider rejected or failed the request.
    #[error("API request failed{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    ApiRequest {
        /// Error description.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The provider answered with something we could not parse.
    #[error("failed to parse provider response: {message}")]
    ResponseParse {
        /// Error description.
        message: String,
    },

    /// Token stream broke mid-way.
    #[error("stream error: {message}")]
    Stream {
        /// Error description.
        message: String,
    },

    /// A tool handler failed.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Error description.
        message: String,
    },

    /// Orchestration-level failure (bad input, channel setup).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Error description.
        message: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// Error description.
        message: String,
    },
}

/// Errors raised by the SQLite stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record that must exist was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier looked up.
        id: String,
    },

    /// The database has not been initialized.
    #[error("database not initialized; run `chatbridge init` first")]
    NotInitialized,

    /// The blocking task running the query panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Errors raised by the SMS transport.
#[derive(Debug, Error)]
pub enum SmsError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The SMS API answered with an error.
    #[error("{message}")]
    Api {
        /// Message extracted from the API response.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Required settings are missing.
    #[error("SMS not configured: {0}")]
    NotConfigured(String),
}

/// Errors raised while running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server loop exited with an error.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command failed while executing.
    #[error("command failed: {0}")]
    ExecutionFailed(String),
}
