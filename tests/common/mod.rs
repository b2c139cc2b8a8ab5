//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::panic)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde_json::Value;

use chatbridge::agent::config::ChatConfigBuilder;
use chatbridge::agent::message::{ContentBlock, ModelRequest, ModelResponse, StopReason, TokenUsage};
use chatbridge::agent::provider::TextStream;
use chatbridge::agent::{ChatConfig, LlmProvider, StreamEvent, ToolCall};
use chatbridge::error::AgentError;
use chatbridge::storage::SqliteStorage;
use chatbridge::tools::{SmsReceipt, SmsSender};

/// Provider replaying scripted responses and recording every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ModelResponse, AgentError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([Err(AgentError::ApiRequest {
                message: message.to_string(),
                status: Some(500),
            })])),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(text("(script exhausted)")))
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<TextStream, AgentError> {
        let response = self.complete(request).await?;
        let deltas: Vec<Result<String, AgentError>> = vec![Ok(response.text())];
        Ok(Box::pin(stream::iter(deltas)))
    }
}

/// A final text answer.
pub fn text(text: &str) -> ModelResponse {
    ModelResponse {
        stop_reason: StopReason::EndTurn,
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
        usage: TokenUsage::default(),
    }
}

/// A tool-use response with optional preamble text.
pub fn tool_use(preamble: &str, id: &str, name: &str, input: Value) -> ModelResponse {
    let mut content = Vec::new();
    if !preamble.is_empty() {
        content.push(ContentBlock::Text {
            text: preamble.to_string(),
        });
    }
    content.push(ContentBlock::ToolUse(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }));
    ModelResponse {
        stop_reason: StopReason::ToolUse,
        content,
        usage: TokenUsage::default(),
    }
}

/// The text of every tool result carried in `request`'s last message.
pub fn last_tool_results(request: &ModelRequest) -> Vec<(String, bool)> {
    request
        .messages
        .last()
        .map(|m| {
            m.content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult(r) => Some((r.content.clone(), r.is_error)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Config with no streaming delay, whole-text chunks and short reply waits.
pub fn fast_config() -> ChatConfigBuilder {
    ChatConfig::builder()
        .api_key("test-key")
        .system_prompt("You are a test assistant.")
        .chunk_delay(Duration::ZERO)
        .chunk_size(10_000)
        .reply_check_interval(Duration::from_millis(10))
        .reply_timeout(Duration::from_secs(5))
}

/// Builds a config, panicking on invalid settings.
pub fn build(builder: ChatConfigBuilder) -> ChatConfig {
    builder.build().unwrap_or_else(|e| panic!("{e}"))
}

/// Initialized in-memory storage.
pub fn storage() -> Arc<SqliteStorage> {
    let storage = SqliteStorage::in_memory().unwrap_or_else(|e| panic!("{e}"));
    storage.init().unwrap_or_else(|e| panic!("{e}"));
    Arc::new(storage)
}

/// Drains an event stream.
pub async fn collect<S>(events: S) -> Vec<StreamEvent>
where
    S: futures_util::Stream<Item = StreamEvent>,
{
    events.collect().await
}

/// SMS sender recording outgoing messages.
#[derive(Default)]
pub struct RecordingSms {
    pub fail_with: Option<String>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(reason.to_string()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send(&self, to: &str, body: &str) -> SmsReceipt {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.to_string(), body.to_string()));
        match &self.fail_with {
            Some(reason) => SmsReceipt {
                success: false,
                sid: None,
                error: Some(reason.clone()),
            },
            None => SmsReceipt {
                success: true,
                sid: Some("SMtest".to_string()),
                error: None,
            },
        }
    }
}
