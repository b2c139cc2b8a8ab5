//! HTTP surface for the chat widget.
//!
//! # Architecture
//!
//! ```text
//! Widget
//!   ├── POST /api/chat        → Orchestrator::stream → text/event-stream
//!   ├── POST /api/chat/load   → ChatStore::load
//! Twilio
//!   └── POST /api/sms/webhook → signature check → PendingReplyStore::record_reply
//! GET /health
//! ```

pub mod routes;
pub mod transport;

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use transport::{serve, serve_listener};

use crate::agent::orchestrator::Orchestrator;
use crate::storage::{ChatStore, PendingReplyStore};

/// Credentials used to verify inbound webhook requests.
#[derive(Clone)]
pub struct WebhookAuth {
    /// Twilio auth token.
    pub auth_token: String,
    /// Public URL Twilio signs requests against.
    pub url: String,
}

impl fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no model provider is configured; chat requests then fail
    /// with 500.
    pub orchestrator: Option<Arc<Orchestrator>>,
    /// Transcript store.
    pub chats: Arc<dyn ChatStore>,
    /// Pending owner requests.
    pub pending: Arc<dyn PendingReplyStore>,
    /// Webhook signature checking; skipped when `None`.
    pub webhook: Option<WebhookAuth>,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(routes::chat))
        .route("/api/chat/load", post(routes::load_chat))
        .route("/api/sms/webhook", post(routes::sms_webhook))
        .route("/health", get(routes::health))
        .with_state(state)
}
