//! Tool invocation gateway.
//!
//! Maps tool names to registered [`ToolHandler`]s. Every invocation yields a
//! [`ToolOutcome`]: either an immediate result or a deferred one whose answer
//! arrives later through a [`PendingReply`]. Handler failures and unknown
//! tool names become error-flagged immediate results so the agentic loop
//! always has something to fold back into the conversation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::tool::{ToolCall, ToolDefinition, ToolSet};
use crate::error::AgentError;

/// Maximum serialized size of tool input JSON from the LLM.
const MAX_TOOL_INPUT_LEN: usize = 100_000;

/// Handle on an external reply that has not arrived yet.
///
/// Backed by some shared slot (a database row, an in-memory cell) that an
/// external actor writes to.
#[async_trait]
pub trait PendingReply: Send + Sync {
    /// Reads the slot. Must be idempotent: returns the same value until
    /// [`PendingReply::clear`] is called.
    async fn check(&self) -> Result<Option<String>, AgentError>;

    /// Empties the slot after its value was consumed so the next value can
    /// be observed.
    async fn clear(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Marks the request as abandoned after the wait deadline passed.
    async fn expire(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Closes the request once its replies were folded into the round.
    async fn finish(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Outcome of one tool invocation.
pub enum ToolOutcome {
    /// The result is available now.
    Immediate {
        /// Result text folded into the conversation.
        result: String,
        /// Whether the result describes a failure.
        is_error: bool,
    },
    /// The result depends on an external actor.
    Deferred {
        /// Acknowledgement text from the dispatch step.
        result: String,
        /// Where the eventual answer shows up.
        reply: Box<dyn PendingReply>,
    },
}

impl ToolOutcome {
    /// Immediate successful result.
    #[must_use]
    pub fn ok(result: impl Into<String>) -> Self {
        Self::Immediate {
            result: result.into(),
            is_error: false,
        }
    }

    /// Immediate error-flagged result.
    #[must_use]
    pub fn failed(result: impl Into<String>) -> Self {
        Self::Immediate {
            result: result.into(),
            is_error: true,
        }
    }

    /// Returns `true` for deferred outcomes.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    /// The result text, regardless of variant.
    #[must_use]
    pub fn result(&self) -> &str {
        match self {
            Self::Immediate { result, .. } | Self::Deferred { result, .. } => result,
        }
    }
}

impl fmt::Debug for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate { result, is_error } => f
                .debug_struct("Immediate")
                .field("result", result)
                .field("is_error", is_error)
                .finish(),
            Self::Deferred { result, .. } => f
                .debug_struct("Deferred")
                .field("result", result)
                .finish_non_exhaustive(),
        }
    }
}

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    /// Chat session the request belongs to, when the client sent one.
    pub session_id: Option<&'a str>,
    /// Provider-assigned id of the tool call.
    pub invocation_id: &'a str,
}

/// A single tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition offered to the model.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] on invalid input or failures the
    /// handler cannot describe as a normal result.
    async fn call(
        &self,
        input: &serde_json::Value,
        ctx: ToolContext<'_>,
    ) -> Result<ToolOutcome, AgentError>;
}

/// The gateway the orchestrator calls once per requested tool.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Tools this gateway can serve.
    fn tool_set(&self) -> ToolSet;

    /// Invokes the tool named in `call`. Never fails: problems come back as
    /// error-flagged immediate outcomes.
    async fn execute(&self, call: &ToolCall, session_id: Option<&str>) -> ToolOutcome;
}

/// Name-keyed registry of [`ToolHandler`]s.
#[derive(Clone, Default)]
pub struct ToolExecutor {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolExecutor {
    /// Creates an empty executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. A later handler with the same name replaces the
    /// earlier one.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        let name = handler.definition().name;
        self.handlers.retain(|h| h.definition().name != name);
        self.handlers.push(handler);
        self
    }

    /// Returns `true` when no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.definition().name == name)
    }
}

impl fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.handlers.iter().map(|h| h.definition().name).collect();
        f.debug_struct("ToolExecutor").field("tools", &names).finish()
    }
}

#[async_trait]
impl ToolGateway for ToolExecutor {
    fn tool_set(&self) -> ToolSet {
        ToolSet::new(self.handlers.iter().map(|h| h.definition()).collect())
    }

    async fn execute(&self, call: &ToolCall, session_id: Option<&str>) -> ToolOutcome {
        let input_len = call.input.to_string().len();
        if input_len > MAX_TOOL_INPUT_LEN {
            return ToolOutcome::failed(format!(
                "tool input too large ({input_len} bytes, max {MAX_TOOL_INPUT_LEN})"
            ));
        }

        let Some(handler) = self.find(&call.name) else {
            warn!(tool = call.name, "model requested unknown tool");
            return ToolOutcome::failed(format!("Unknown tool: {}", call.name));
        };

        let ctx = ToolContext {
            session_id,
            invocation_id: &call.id,
        };

        match handler.call(&call.input, ctx).await {
            Ok(outcome) => {
                debug!(
                    tool = call.name,
                    call_id = call.id,
                    deferred = outcome.is_deferred(),
                    "tool dispatched"
                );
                outcome
            }
            Err(e) => {
                warn!(tool = call.name, call_id = call.id, error = %e, "tool failed");
                ToolOutcome::failed(e.to_string())
            }
        }
    }
}
