//! Anthropic Messages API provider over `reqwest`.
//!
//! Our [`ContentBlock`] serialization already matches the Messages API
//! block format, so requests are built from the generic types directly.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::agent::config::ChatConfig;
use crate::agent::message::{ContentBlock, ModelRequest, ModelResponse, StopReason, TokenUsage};
use crate::agent::provider::{LlmProvider, TextStream};
use crate::agent::tool::ToolCall;
use crate::error::AgentError;

/// Default API endpoint.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
/// Messages API version header value.
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl AnthropicProvider {
    /// Creates a new provider from chat configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    fn build_body(request: &ModelRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": request.messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, AgentError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::ApiRequest {
                message: api_error_message(&text),
                status: Some(status.as_u16()),
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Extracts `error.message` from an API error body, falling back to the raw
/// body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn into_response(wire: MessagesResponse) -> ModelResponse {
    let content = wire
        .content
        .into_iter()
        .filter_map(|block| match block {
            WireBlock::Text { text } => Some(ContentBlock::Text { text }),
            WireBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::ToolUse(ToolCall { id, name, input }))
            }
            WireBlock::Other => None,
        })
        .collect();

    ModelResponse {
        stop_reason: wire
            .stop_reason
            .as_deref()
            .map_or(StopReason::EndTurn, StopReason::parse),
        content,
        usage: wire.usage,
    }
}

/// Text carried by one streaming event, if any.
///
/// # Errors
///
/// Returns [`AgentError::Stream`] for `error` events.
fn parse_stream_event(event: &str, data: &str) -> Result<Option<String>, AgentError> {
    match event {
        "content_block_delta" => {
            let value: Value = serde_json::from_str(data).map_err(|e| AgentError::ResponseParse {
                message: e.to_string(),
            })?;
            let delta = &value["delta"];
            if delta["type"] == "text_delta" {
                Ok(delta["text"].as_str().map(String::from))
            } else {
                Ok(None)
            }
        }
        "error" => Err(AgentError::Stream {
            message: api_error_message(data),
        }),
        _ => Ok(None),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let response = self.post(&Self::build_body(request, false)).await?;
        let wire: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| AgentError::ResponseParse {
                    message: e.to_string(),
                })?;
        Ok(into_response(wire))
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<TextStream, AgentError> {
        let response = self.post(&Self::build_body(request, true)).await?;
        let deltas = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        trace!(event = event.event, "anthropic stream event");
                        parse_stream_event(&event.event, &event.data).transpose()
                    }
                    Err(e) => Some(Err(AgentError::Stream {
                        message: e.to_string(),
                    })),
                }
            });
        Ok(Box::pin(deltas))
    }
}
