//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ModelRequest`]/[`ModelResponse`]
//! into provider-specific API calls. This keeps the orchestrator decoupled
//! from any particular LLM vendor.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::{ModelRequest, ModelResponse};
use crate::error::AgentError;

/// Stream of text deltas from a token-level completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls) for a
/// specific provider while presenting a uniform interface to the
/// orchestrator.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"anthropic"`, `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes one completion and returns the whole response.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or parse errors.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError>;

    /// Executes a streaming completion.
    ///
    /// Returns a stream of text deltas as they arrive from the provider.
    /// Only used by the toolless profile; tool blocks are not surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on connection or streaming failures.
    async fn complete_stream(&self, request: &ModelRequest) -> Result<TextStream, AgentError>;
}
