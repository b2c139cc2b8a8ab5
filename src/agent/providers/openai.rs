//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override in [`ChatConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionStreamResponse,
    FinishReason, FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::agent::config::ChatConfig;
use crate::agent::message::{
    ContentBlock, ModelMessage, ModelRequest, ModelResponse, Role, StopReason, TokenUsage,
};
use crate::agent::provider::{LlmProvider, TextStream};
use crate::agent::tool::ToolCall;
use crate::error::AgentError;

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible
/// with any API that follows the `OpenAI` chat completion spec.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a new provider from chat configuration.
    #[must_use]
    pub fn new(config: &ChatConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
        }
    }

    /// Converts one of our messages to `OpenAI` messages.
    ///
    /// A user message carrying tool results becomes one `tool` message per
    /// result, since `OpenAI` has no block-structured user content for them.
    fn convert_message(msg: &ModelMessage) -> Vec<ChatCompletionRequestMessage> {
        match msg.role {
            Role::User => {
                let mut out: Vec<ChatCompletionRequestMessage> = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolResult(result) => Some(
                            ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                                content: ChatCompletionRequestToolMessageContent::Text(
                                    result.content.clone(),
                                ),
                                tool_call_id: result.tool_call_id.clone(),
                            }),
                        ),
                        _ => None,
                    })
                    .collect();

                let text = msg.text();
                if !text.is_empty() {
                    out.push(ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessage {
                            content: ChatCompletionRequestUserMessageContent::Text(text),
                            name: None,
                        },
                    ));
                }
                out
            }
            Role::Assistant => {
                let calls: Vec<ChatCompletionMessageToolCall> = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolUse(call) => Some(ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.input.to_string(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();

                let text = msg.text();
                let content = (!text.is_empty())
                    .then_some(ChatCompletionRequestAssistantMessageContent::Text(text));
                let tool_calls = (!calls.is_empty()).then_some(calls);

                #[allow(deprecated)]
                let assistant = ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                };
                vec![ChatCompletionRequestMessage::Assistant(assistant)]
            }
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ModelRequest, stream: bool) -> CreateChatCompletionRequest {
        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(request.system.clone()),
                name: None,
            },
        )];
        messages.extend(request.messages.iter().flat_map(Self::convert_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|td| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: td.name.clone(),
                            description: Some(td.description.clone()),
                            parameters: Some(td.input_schema.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            max_completion_tokens: Some(request.max_tokens),
            stream: stream.then_some(true),
            tools,
            ..Default::default()
        }
    }

    fn map_finish_reason(reason: Option<&FinishReason>) -> StopReason {
        match reason {
            Some(FinishReason::ToolCalls | FinishReason::FunctionCall) => StopReason::ToolUse,
            Some(FinishReason::Length) => StopReason::MaxTokens,
            Some(FinishReason::ContentFilter) => StopReason::Other("content_filter".to_string()),
            Some(FinishReason::Stop) | None => StopReason::EndTurn,
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let openai_request = Self::build_request(request, false);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        let choice = response.choices.first();
        let mut content = Vec::new();

        if let Some(text) = choice
            .and_then(|c| c.message.content.as_ref())
            .filter(|t| !t.is_empty())
        {
            content.push(ContentBlock::Text { text: text.clone() });
        }

        if let Some(calls) = choice.and_then(|c| c.message.tool_calls.as_ref()) {
            content.extend(calls.iter().map(|tc| {
                let input = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(tc.function.arguments.clone()));
                ContentBlock::ToolUse(ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    input,
                })
            }));
        }

        let stop_reason = Self::map_finish_reason(choice.and_then(|c| c.finish_reason.as_ref()));

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            });

        Ok(ModelResponse {
            stop_reason,
            content,
            usage,
        })
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<TextStream, AgentError> {
        let openai_request = Self::build_request(request, true);

        let stream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        let mapped = stream.map(
            |result: Result<
                CreateChatCompletionStreamResponse,
                async_openai::error::OpenAIError,
            >| {
                match result {
                    Ok(response) => {
                        let text = response
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.as_ref())
                            .cloned()
                            .unwrap_or_default();
                        Ok(text)
                    }
                    Err(e) => Err(AgentError::Stream {
                        message: e.to_string(),
                    }),
                }
            },
        );

        Ok(Box::pin(mapped))
    }
}
