//! Route handlers.

use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::AppState;
use crate::agent::message::ConversationTurn;
use crate::agent::orchestrator::ChatRequest;
use crate::tools::webhook::{
    EMPTY_TWIML, SIGNATURE_HEADER, WebhookMessage, parse_webhook_body, validate_signature,
};

const MESSAGE_REQUIRED: &str = "Message is required";
const SESSION_REQUIRED: &str = "Session ID is required";
const INVALID_BODY: &str = "Invalid request body";
const NOT_CONFIGURED: &str = "Chat service not configured";
const LOAD_FAILED: &str = "Failed to load chat";

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Validates a `/api/chat` body: `{ message, sessionId?, history? }`.
///
/// `message` must be a non-empty string. Everything else is optional.
fn parse_chat_body(body: &[u8]) -> Result<ChatRequest, &'static str> {
    let value: Value = serde_json::from_slice(body).map_err(|_| INVALID_BODY)?;
    if !value.is_object() {
        return Err(INVALID_BODY);
    }

    let message = value
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or(MESSAGE_REQUIRED)?;

    let history = match value.get("history") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value::<Vec<ConversationTurn>>(raw.clone())
            .map_err(|_| INVALID_BODY)?,
    };

    Ok(ChatRequest {
        message: message.to_string(),
        session_id: value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
        history,
    })
}

/// `POST /api/chat`: streams the answer as server-sent events.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_chat_body(&body) {
        Ok(request) => request,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let Some(orchestrator) = state.orchestrator else {
        error!("chat request received but no model provider is configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, NOT_CONFIGURED);
    };

    info!(
        session_id = request.session_id().unwrap_or("-"),
        history = request.history.len(),
        "chat request"
    );

    let frames = orchestrator
        .stream(request)
        .map(|event| Ok::<_, Infallible>(event.to_frame()));

    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// `POST /api/chat/load`: returns the stored transcript, or `null`.
pub async fn load_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, INVALID_BODY);
    };
    let Some(session_id) = value
        .get("sessionId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, SESSION_REQUIRED);
    };

    match state.chats.load(session_id).await {
        Ok(messages) => Json(json!({ "messages": messages })).into_response(),
        Err(e) => {
            error!(session_id, error = %e, "failed to load chat");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, LOAD_FAILED)
        }
    }
}

fn twiml(status: StatusCode) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/xml")],
        EMPTY_TWIML,
    )
        .into_response()
}

/// `POST /api/sms/webhook`: stores the owner's reply on the most recent
/// pending request.
pub async fn sms_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let params = parse_webhook_body(&body);

    if let Some(auth) = &state.webhook {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !validate_signature(&auth.auth_token, signature, &auth.url, &params) {
            warn!("rejected webhook with invalid signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let Some(message) = WebhookMessage::from_params(&params) else {
        warn!("webhook without message body");
        return twiml(StatusCode::OK);
    };

    let pending = match state.pending.most_recent_pending().await {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "failed to look up pending request");
            return twiml(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let Some(pending) = pending else {
        warn!(
            from = message.from.as_deref().unwrap_or("-"),
            "owner reply with no pending request"
        );
        return twiml(StatusCode::OK);
    };

    match state.pending.record_reply(&pending.id, &message.body).await {
        Ok(record) => {
            info!(
                session_id = record.session_id,
                pending_id = record.id,
                sid = message.message_sid.as_deref().unwrap_or("-"),
                "owner reply recorded"
            );
            twiml(StatusCode::OK)
        }
        Err(e) => {
            error!(pending_id = pending.id, error = %e, "failed to record owner reply");
            twiml(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /health`.
pub async fn health() -> &'static str {
    "ok"
}
