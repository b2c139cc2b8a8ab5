//! Agentic streaming orchestrator.
//!
//! Drives one chat request end to end: projects the history, runs the
//! model ↔ tool loop, streams text to the widget, waits on deferred tools,
//! and persists the finished round.
//!
//! ```text
//! request → project history + message
//!   loop ≤ max_tool_rounds:
//!     model call
//!     ├── tool_use → preamble text → gateway per call
//!     │     ├── immediate → fold result
//!     │     └── deferred  → waiting event → reply-wait → fold replies | fallback
//!     └── final text → chunked text events → break
//!   persist (logged on failure) → [DONE]
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::config::ChatConfig;
use super::executor::{ToolGateway, ToolOutcome};
use super::message::{ConversationTurn, ModelMessage, ModelRequest, project_history};
use super::prompt::{
    GENERIC_ERROR_MESSAGE, NO_REPLY_FALLBACK, PromptSet, ROUND_LIMIT_FALLBACK, WAITING_MESSAGE,
    build_owner_instructions,
};
use super::provider::LlmProvider;
use super::reply_wait::{ReplyOutcome, collect_replies};
use super::stream::{EventSink, StreamEvent, channel, split_for_streaming};
use super::tool::{ToolCall, ToolResult};
use crate::error::AgentError;
use crate::storage::ChatStore;

/// One chat request from the widget.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The new user message.
    pub message: String,
    /// Session to persist under, if any.
    pub session_id: Option<String>,
    /// Prior turns, oldest first.
    pub history: Vec<ConversationTurn>,
}

impl ChatRequest {
    /// Creates a request without session or history.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Non-empty session id.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// What a finished round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// All assistant text emitted, in order.
    pub response: String,
    /// Model calls made.
    pub model_calls: usize,
    /// Whether the transcript was saved.
    pub persisted: bool,
    /// Whether the round ended with an error event.
    pub failed: bool,
}

/// Runs chat rounds against one provider.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    config: ChatConfig,
    prompts: PromptSet,
    tools: Option<Arc<dyn ToolGateway>>,
    store: Option<Arc<dyn ChatStore>>,
}

impl Orchestrator {
    /// Creates an orchestrator without tools or persistence.
    ///
    /// Uses [`ChatConfig::system_prompt`] when set, otherwise loads prompt
    /// templates from [`ChatConfig::prompt_dir`].
    pub fn new(provider: Arc<dyn LlmProvider>, config: ChatConfig) -> Self {
        let prompts = config.system_prompt.as_deref().map_or_else(
            || PromptSet::load(config.prompt_dir.as_deref()),
            PromptSet::with_system,
        );
        Self {
            provider,
            config,
            prompts,
            tools: None,
            store: None,
        }
    }

    /// Offers the gateway's tools to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<dyn ToolGateway>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Persists finished rounds to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// System prompt in use.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.prompts.system
    }

    /// Starts a round on a background task and returns its event stream.
    ///
    /// The task runs to completion (and persists) even if the returned
    /// stream is dropped.
    pub fn stream(self: &Arc<Self>, request: ChatRequest) -> ReceiverStream<StreamEvent> {
        let (sink, events) = channel(self.config.event_buffer);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(request, &sink).await;
        });
        events
    }

    /// Runs one round, writing events into `sink`.
    ///
    /// Always ends with exactly one terminal event: [`StreamEvent::Done`]
    /// on success, a generic [`StreamEvent::Error`] otherwise.
    pub async fn run(&self, request: ChatRequest, sink: &EventSink) -> RoundSummary {
        let mut summary = RoundSummary::default();
        let session_id = request.session_id();

        if let Err(e) = self.respond(&request, sink, &mut summary).await {
            error!(session_id, error = %e, "chat round failed");
            summary.failed = true;
            sink.send(StreamEvent::Error(GENERIC_ERROR_MESSAGE.to_string()))
                .await;
            return summary;
        }

        if let (Some(store), Some(session_id)) = (&self.store, session_id)
            && !summary.response.is_empty()
        {
            let mut turns = request.history.clone();
            turns.push(ConversationTurn::user(&request.message));
            turns.push(ConversationTurn::bot(&summary.response));
            match store.save(session_id, &turns).await {
                Ok(()) => {
                    summary.persisted = true;
                    debug!(session_id, turns = turns.len(), "round persisted");
                }
                Err(e) => warn!(session_id, error = %e, "failed to save chat"),
            }
        }

        sink.send(StreamEvent::Done).await;
        info!(
            session_id,
            model_calls = summary.model_calls,
            chars = summary.response.len(),
            "chat round complete"
        );
        summary
    }

    async fn respond(
        &self,
        request: &ChatRequest,
        sink: &EventSink,
        summary: &mut RoundSummary,
    ) -> Result<(), AgentError> {
        let tool_set = self
            .tools
            .as_ref()
            .map(|t| t.tool_set())
            .unwrap_or_default();

        let mut model_request = ModelRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: self.prompts.system.clone(),
            messages: project_history(&request.history, &request.message),
            tools: tool_set.definitions().to_vec(),
        };

        if tool_set.is_empty() && self.config.token_streaming {
            return self.stream_tokens(&model_request, sink, summary).await;
        }

        let session_id = request.session_id();
        for round in 1..=self.config.max_tool_rounds {
            summary.model_calls += 1;
            let response = self.provider.complete(&model_request).await?;
            debug!(
                session_id,
                round,
                stop_reason = ?response.stop_reason,
                output_tokens = response.usage.output_tokens,
                "model responded"
            );

            let Some(tools) = self.tools.as_ref().filter(|_| response.wants_tools()) else {
                self.emit_chunked(&response.text(), sink, &mut summary.response)
                    .await;
                return Ok(());
            };

            let preamble = response.text();
            if !preamble.is_empty() {
                sink.send(StreamEvent::Text(preamble.clone())).await;
                summary.response.push_str(&preamble);
            }

            let calls: Vec<ToolCall> = response.tool_calls().into_iter().cloned().collect();
            model_request
                .messages
                .push(ModelMessage::assistant_blocks(response.content));

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(self.invoke(tools.as_ref(), call, session_id, sink).await);
            }
            model_request
                .messages
                .push(ModelMessage::tool_results(results));
        }

        warn!(
            session_id,
            max_tool_rounds = self.config.max_tool_rounds,
            "tool round limit reached without a final answer"
        );
        if self.config.round_limit_fallback && summary.response.is_empty() {
            self.emit_chunked(ROUND_LIMIT_FALLBACK, sink, &mut summary.response)
                .await;
        }
        Ok(())
    }

    /// Runs one tool call and turns its outcome into a tool result.
    async fn invoke(
        &self,
        tools: &dyn ToolGateway,
        call: &ToolCall,
        session_id: Option<&str>,
        sink: &EventSink,
    ) -> ToolResult {
        match tools.execute(call, session_id).await {
            ToolOutcome::Immediate { result, is_error } => {
                debug!(tool = call.name, is_error, "tool returned immediately");
                if is_error {
                    ToolResult::error(&call.id, result)
                } else {
                    ToolResult::success(&call.id, result)
                }
            }
            ToolOutcome::Deferred { result, reply } => {
                debug!(tool = call.name, ack = result, "waiting for external reply");
                sink.send(StreamEvent::Waiting(WAITING_MESSAGE.to_string()))
                    .await;

                match collect_replies(reply.as_ref(), &self.config.wait_options()).await {
                    ReplyOutcome::Replied { replies, finalized } => {
                        info!(
                            session_id,
                            tool = call.name,
                            replies = replies.len(),
                            finalized,
                            "owner replied"
                        );
                        if let Err(e) = reply.finish().await {
                            warn!(session_id, error = %e, "failed to close answered request");
                        }
                        let signal = finalized
                            .then(|| self.config.reply_policy.sentinel())
                            .flatten();
                        ToolResult::success(&call.id, build_owner_instructions(&replies, signal))
                    }
                    ReplyOutcome::NoReply { finalized } => {
                        info!(session_id, tool = call.name, finalized, "no owner reply");
                        if let Err(e) = reply.expire().await {
                            warn!(session_id, error = %e, "failed to mark request timed out");
                        }
                        ToolResult::error(&call.id, NO_REPLY_FALLBACK)
                    }
                }
            }
        }
    }

    /// Streams `text` in fixed-size pieces with a short pause between them.
    ///
    /// Text is accumulated even after the consumer disconnects so the round
    /// still persists what the model said.
    async fn emit_chunked(&self, text: &str, sink: &EventSink, accumulated: &mut String) {
        for piece in split_for_streaming(text, self.config.chunk_size) {
            sink.send(StreamEvent::Text(piece.to_string())).await;
            accumulated.push_str(piece);
            if !sink.is_closed() && !self.config.chunk_delay.is_zero() {
                sleep(self.config.chunk_delay).await;
            }
        }
    }

    /// Toolless profile: forwards provider token deltas as they arrive.
    async fn stream_tokens(
        &self,
        request: &ModelRequest,
        sink: &EventSink,
        summary: &mut RoundSummary,
    ) -> Result<(), AgentError> {
        summary.model_calls += 1;
        let mut deltas = self.provider.complete_stream(request).await?;
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            if delta.is_empty() {
                continue;
            }
            sink.send(StreamEvent::Text(delta.clone())).await;
            summary.response.push_str(&delta);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;

    use crate::agent::executor::{ToolContext, ToolExecutor, ToolHandler};
    use crate::agent::message::{ContentBlock, ModelResponse, StopReason, TokenUsage};
    use crate::agent::provider::TextStream;
    use crate::agent::tool::{ToolDefinition, ToolSet};

    /// Provider replaying scripted responses and recording requests.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<ModelResponse, AgentError>>>,
        deltas: Vec<String>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<ModelResponse, AgentError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                deltas: Vec::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ModelRequest> {
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
                .unwrap_or_else(|| Ok(text_response("(exhausted)")))
        }

        async fn complete_stream(&self, _request: &ModelRequest) -> Result<TextStream, AgentError> {
            let items: Vec<Result<String, AgentError>> =
                self.deltas.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn text_response(text: &str) -> ModelResponse {
        ModelResponse {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            usage: TokenUsage::default(),
        }
    }

    fn tool_response(id: &str) -> ModelResponse {
        ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![ContentBlock::ToolUse(ToolCall {
                id: id.to_string(),
                name: "lookup".to_string(),
                input: json!({}),
            })],
            usage: TokenUsage::default(),
        }
    }

    struct LookupTool;

    #[async_trait]
    impl ToolGateway for LookupTool {
        fn tool_set(&self) -> ToolSet {
            ToolSet::new(vec![ToolDefinition {
                name: "lookup".to_string(),
                description: "Looks things up".to_string(),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn execute(&self, _call: &ToolCall, _session_id: Option<&str>) -> ToolOutcome {
            ToolOutcome::ok("found it")
        }
    }

    /// Handler that always fails.
    struct BrokenTool;

    #[async_trait]
    impl ToolHandler for BrokenTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "inventory".to_string(),
                description: "Checks stock".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            _input: &serde_json::Value,
            _ctx: ToolContext<'_>,
        ) -> Result<ToolOutcome, AgentError> {
            Err(AgentError::ToolExecution {
                name: "inventory".to_string(),
                message: "index offline".to_string(),
            })
        }
    }

    struct FoundTool;

    #[async_trait]
    impl ToolHandler for FoundTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "lookup".to_string(),
                description: "Looks things up".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            _input: &serde_json::Value,
            _ctx: ToolContext<'_>,
        ) -> Result<ToolOutcome, AgentError> {
            Ok(ToolOutcome::ok("found it"))
        }
    }

    fn call_block(id: &str, name: &str) -> ContentBlock {
        ContentBlock::ToolUse(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({}),
        })
    }

    fn config() -> ChatConfig {
        ChatConfig::builder()
            .api_key("test")
            .system_prompt("You are a test assistant.")
            .chunk_delay(Duration::ZERO)
            .max_tool_rounds(3)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    async fn run(orchestrator: &Orchestrator, request: ChatRequest) -> (RoundSummary, Vec<StreamEvent>) {
        let (sink, events) = channel(256);
        let summary = orchestrator.run(request, &sink).await;
        drop(sink);
        (summary, events.collect().await)
    }

    #[tokio::test]
    async fn test_final_text_streams_and_ends_with_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("Hello!"))]));
        let orchestrator = Orchestrator::new(provider.clone(), config());
        let (summary, events) = run(&orchestrator, ChatRequest::new("hi")).await;

        assert_eq!(events, vec![StreamEvent::Text("Hello!".to_string()), StreamEvent::Done]);
        assert_eq!(summary.response, "Hello!");
        assert_eq!(summary.model_calls, 1);
        assert!(!summary.persisted);

        let requests = provider.requests();
        assert_eq!(requests[0].system, "You are a test assistant.");
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_round_limit_streams_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response("t1")),
            Ok(tool_response("t2")),
            Ok(tool_response("t3")),
            Ok(tool_response("t4")),
        ]));
        let orchestrator =
            Orchestrator::new(provider.clone(), config()).with_tools(Arc::new(LookupTool));
        let (summary, events) = run(&orchestrator, ChatRequest::new("loop")).await;

        assert_eq!(summary.model_calls, 3);
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(summary.response, ROUND_LIMIT_FALLBACK);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_round_limit_without_fallback_is_silent() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response("t1")),
            Ok(tool_response("t2")),
            Ok(tool_response("t3")),
        ]));
        let config = ChatConfig::builder()
            .api_key("test")
            .max_tool_rounds(3)
            .round_limit_fallback(false)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let orchestrator = Orchestrator::new(provider, config).with_tools(Arc::new(LookupTool));
        let (summary, events) = run(&orchestrator, ChatRequest::new("loop")).await;
        assert!(summary.response.is_empty());
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_provider_error_emits_generic_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(AgentError::ApiRequest {
            message: "overloaded".to_string(),
            status: Some(529),
        })]));
        let orchestrator = Orchestrator::new(provider, config());
        let (summary, events) = run(&orchestrator, ChatRequest::new("hi")).await;

        assert!(summary.failed);
        assert_eq!(
            events,
            vec![StreamEvent::Error(GENERIC_ERROR_MESSAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn test_tool_results_fold_into_next_request() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response("t1")),
            Ok(text_response("Done looking.")),
        ]));
        let orchestrator =
            Orchestrator::new(provider.clone(), config()).with_tools(Arc::new(LookupTool));
        let (summary, _events) = run(&orchestrator, ChatRequest::new("look it up")).await;
        assert_eq!(summary.response, "Done looking.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(
            second[2],
            ModelMessage::tool_results(vec![ToolResult::success("t1", "found it")])
        );
    }

    #[tokio::test]
    async fn test_several_calls_answer_in_order_despite_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(ModelResponse {
                stop_reason: StopReason::ToolUse,
                content: vec![call_block("t1", "inventory"), call_block("t2", "lookup")],
                usage: TokenUsage::default(),
            }),
            Ok(text_response("One of those worked.")),
        ]));
        let tools = ToolExecutor::new()
            .with_handler(Arc::new(BrokenTool))
            .with_handler(Arc::new(FoundTool));
        let orchestrator = Orchestrator::new(provider.clone(), config()).with_tools(Arc::new(tools));
        let (summary, events) = run(&orchestrator, ChatRequest::new("check both")).await;

        assert_eq!(summary.response, "One of those worked.");
        assert_eq!(events.last(), Some(&StreamEvent::Done));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].messages.last(),
            Some(&ModelMessage::tool_results(vec![
                ToolResult::error("t1", "tool 'inventory' failed: index offline"),
                ToolResult::success("t2", "found it"),
            ]))
        );
    }

    #[tokio::test]
    async fn test_token_streaming_profile() {
        let provider = Arc::new(ScriptedProvider {
            deltas: vec!["Hel".to_string(), String::new(), "lo!".to_string()],
            ..ScriptedProvider::new(Vec::new())
        });
        let config = ChatConfig::builder()
            .api_key("test")
            .token_streaming(true)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let orchestrator = Orchestrator::new(provider.clone(), config);
        let (summary, events) = run(&orchestrator, ChatRequest::new("hi")).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Hel".to_string()),
                StreamEvent::Text("lo!".to_string()),
                StreamEvent::Done,
            ]
        );
        assert_eq!(summary.response, "Hello!");
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_text_accumulates_after_disconnect() {
        let long = "x".repeat(100);
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response(&long))]));
        let orchestrator = Orchestrator::new(provider, config());
        let (sink, events) = channel(1);
        drop(events);
        let summary = orchestrator.run(ChatRequest::new("hi"), &sink).await;
        assert_eq!(summary.response, long);
        assert!(sink.is_closed());
    }

    #[test]
    fn test_blank_session_id_is_none() {
        let request = ChatRequest {
            session_id: Some(String::new()),
            ..ChatRequest::new("hi")
        };
        assert_eq!(request.session_id(), None);
    }
}
