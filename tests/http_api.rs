//! HTTP API tests against a server bound to an ephemeral port.

#![allow(clippy::panic)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use chatbridge::agent::{Orchestrator, ReplyPolicy, ToolExecutor};
use chatbridge::server::{AppState, WebhookAuth, serve_listener};
use chatbridge::storage::{PendingReplyStore, SqliteStorage};
use chatbridge::tools::webhook::{SIGNATURE_HEADER, compute_signature};
use chatbridge::tools::{SMS_TOOL_NAME, SmsNotifyTool};

use common::{RecordingSms, ScriptedProvider, build, fast_config, storage, text, tool_use};

const AUTH_TOKEN: &str = "twilio-secret";

struct TestServer {
    base: String,
    store: Arc<SqliteStorage>,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(orchestrator: Option<Arc<Orchestrator>>, store: Arc<SqliteStorage>, signed: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let addr = listener.local_addr().unwrap_or_else(|e| panic!("{e}"));
        let base = format!("http://{addr}");

        let state = AppState {
            orchestrator,
            chats: store.clone(),
            pending: store.clone(),
            webhook: signed.then(|| WebhookAuth {
                auth_token: AUTH_TOKEN.to_string(),
                url: format!("{base}/api/sms/webhook"),
            }),
        };

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = serve_listener(listener, state, token).await;
        });

        Self {
            base,
            store,
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn chat_orchestrator(provider: Arc<ScriptedProvider>, store: &Arc<SqliteStorage>) -> Arc<Orchestrator> {
    let config = build(fast_config().reply_policy(ReplyPolicy::FirstReply));
    let tool = SmsNotifyTool::new(RecordingSms::ok(), store.clone(), "+15550001111");
    Arc::new(
        Orchestrator::new(provider, config)
            .with_tools(Arc::new(ToolExecutor::new().with_handler(Arc::new(tool))))
            .with_store(store.clone()),
    )
}

async fn post_json(url: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("{e}"))
}

async fn post_webhook(server: &TestServer, params: &[(&str, &str)], signature: Option<&str>) -> reqwest::Response {
    let map: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let url = server.url("/api/sms/webhook");
    let signature = signature.map_or_else(|| compute_signature(AUTH_TOKEN, &url, &map), str::to_string);

    reqwest::Client::new()
        .post(&url)
        .header(SIGNATURE_HEADER, signature)
        .form(params)
        .send()
        .await
        .unwrap_or_else(|e| panic!("{e}"))
}

/// Parses SSE `data:` payloads; the done marker comes back as a string.
fn data_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string())))
        .collect()
}

fn header<'a>(response: &'a reqwest::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_chat_streams_sse_frames() {
    let store = storage();
    let provider = ScriptedProvider::new(vec![text("Hello!")]);
    let server = TestServer::start(Some(chat_orchestrator(provider, &store)), store, false).await;

    let response = post_json(&server.url("/api/chat"), &json!({"message": "hi", "sessionId": "s1"})).await;
    assert_eq!(response.status(), 200);
    assert!(header(&response, "content-type").starts_with("text/event-stream"));
    assert_eq!(header(&response, "cache-control"), "no-cache");

    let body = response.text().await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(body, "data: {\"text\":\"Hello!\"}\n\ndata: [DONE]\n\n");
}

#[tokio::test]
async fn test_empty_message_rejected_without_model_call() {
    let store = storage();
    let provider = ScriptedProvider::new(vec![text("never")]);
    let server = TestServer::start(Some(chat_orchestrator(provider.clone(), &store)), store, false).await;

    for body in [json!({"message": ""}), json!({"message": 7}), json!({})] {
        let response = post_json(&server.url("/api/chat"), &body).await;
        assert_eq!(response.status(), 400);
        let payload: Value = response.json().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(payload, json!({"error": "Message is required"}));
    }

    let malformed = reqwest::Client::new()
        .post(server.url("/api/chat"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(malformed.status(), 400);

    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_unconfigured_chat_is_500() {
    let server = TestServer::start(None, storage(), false).await;
    let response = post_json(&server.url("/api/chat"), &json!({"message": "hi"})).await;
    assert_eq!(response.status(), 500);
    let payload: Value = response.json().await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(payload["error"], "Chat service not configured");
}

#[tokio::test]
async fn test_load_returns_saved_conversation() {
    let store = storage();
    let provider = ScriptedProvider::new(vec![text("Hello!")]);
    let server = TestServer::start(Some(chat_orchestrator(provider, &store)), store, false).await;

    let chat = post_json(&server.url("/api/chat"), &json!({"message": "hi", "sessionId": "s1"})).await;
    let _ = chat.text().await;

    let loaded: Value = post_json(&server.url("/api/chat/load"), &json!({"sessionId": "s1"}))
        .await
        .json()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        loaded,
        json!({"messages": [
            {"sender": "user", "text": "hi"},
            {"sender": "bot", "text": "Hello!"}
        ]})
    );

    let unknown: Value = post_json(&server.url("/api/chat/load"), &json!({"sessionId": "nope"}))
        .await
        .json()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(unknown, json!({"messages": null}));

    let missing = post_json(&server.url("/api/chat/load"), &json!({})).await;
    assert_eq!(missing.status(), 400);
}

#[tokio::test]
async fn test_webhook_records_reply_on_pending_request() {
    let store = storage();
    let server = TestServer::start(None, store.clone(), true).await;
    server
        .store
        .create_pending("s1", "toolu_1", "Lead wants a quote", None)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let response = post_webhook(
        &server,
        &[("From", "+15550001111"), ("Body", "Quote $500"), ("MessageSid", "SM1")],
        None,
    )
    .await;
    assert_eq!(response.status(), 200);
    assert!(header(&response, "content-type").starts_with("text/xml"));
    let body = response.text().await.unwrap_or_else(|e| panic!("{e}"));
    assert!(body.contains("<Response></Response>"));

    assert_eq!(
        store.check_reply("s1").await.unwrap_or_else(|e| panic!("{e}")).as_deref(),
        Some("Quote $500")
    );
    assert!(
        store
            .pending_for_session("s1")
            .await
            .unwrap_or_else(|e| panic!("{e}"))
            .is_none()
    );
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let store = storage();
    let server = TestServer::start(None, store.clone(), true).await;
    store
        .create_pending("s1", "toolu_1", "hi", None)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let response = post_webhook(&server, &[("Body", "forged")], Some("bm90LXRoZS1zaWduYXR1cmU=")).await;
    assert_eq!(response.status(), 403);
    assert_eq!(store.check_reply("s1").await.unwrap_or_else(|e| panic!("{e}")), None);
}

#[tokio::test]
async fn test_webhook_without_pending_request_still_acknowledges() {
    let server = TestServer::start(None, storage(), true).await;
    let response = post_webhook(&server, &[("Body", "hello?")], None).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start(None, storage(), false).await;
    let body = reqwest::get(server.url("/health"))
        .await
        .unwrap_or_else(|e| panic!("{e}"))
        .text()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_owner_reply_via_webhook_completes_stream() {
    let store = storage();
    let provider = ScriptedProvider::new(vec![
        tool_use("", "toolu_1", SMS_TOOL_NAME, json!({"message": "Visitor wants a demo"})),
        text("Our team can do Tuesday."),
    ]);
    let server = Arc::new(
        TestServer::start(Some(chat_orchestrator(provider.clone(), &store)), store.clone(), true).await,
    );

    let chat_url = server.url("/api/chat");
    let chat = tokio::spawn(async move {
        post_json(&chat_url, &json!({"message": "Can I get a demo?", "sessionId": "demo"}))
            .await
            .text()
            .await
            .unwrap_or_else(|e| panic!("{e}"))
    });

    // Wait for the SMS to go out, then answer as the owner.
    for _ in 0..500 {
        if store
            .most_recent_pending()
            .await
            .unwrap_or_else(|e| panic!("{e}"))
            .is_some()
        {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let ack = post_webhook(&server, &[("From", "+15550001111"), ("Body", "Tuesday 2pm works")], None).await;
    assert_eq!(ack.status(), 200);

    let body = chat.await.unwrap_or_else(|e| panic!("{e}"));
    let frames = data_frames(&body);
    assert_eq!(
        frames,
        vec![
            json!({"type": "waiting", "message": "Checking with a team member..."}),
            json!({"text": "Our team can do Tuesday."}),
            json!("[DONE]"),
        ]
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let folded = serde_json::to_string(&requests[1].messages).unwrap_or_default();
    assert!(folded.contains("Tuesday 2pm works"));
}
