//! Agentic chat system.
//!
//! Streams model answers to the widget and lets the model call tools,
//! including tools whose result arrives later from a human.
//!
//! # Architecture
//!
//! ```text
//! ChatRequest → Orchestrator
//!   ├── LlmProvider (Anthropic Messages API or OpenAI-compatible)
//!   ├── ToolGateway → ToolHandler → Immediate | Deferred(PendingReply)
//!   │   └── reply_wait polls the PendingReply until answered or timed out
//!   ├── EventSink → StreamEvent (text / waiting / error / done)
//!   └── ChatStore persists the finished round
//! ```
//!
//! # Feature Gate
//!
//! The `OpenAI`-compatible provider requires the `openai` feature (on by
//! default). The Anthropic provider is always available.

pub mod client;
pub mod config;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reply_wait;
pub mod stream;
pub mod tool;

// Re-export key types
pub use client::create_provider;
pub use config::{ChatConfig, ChatConfigBuilder};
pub use executor::{PendingReply, ToolContext, ToolExecutor, ToolGateway, ToolHandler, ToolOutcome};
pub use message::{ConversationTurn, ModelMessage, ModelRequest, ModelResponse, Role, Sender, TokenUsage};
pub use orchestrator::{ChatRequest, Orchestrator, RoundSummary};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use reply_wait::{ReplyOutcome, ReplyPolicy, WaitOptions};
pub use stream::{EventSink, StreamEvent};
pub use tool::{ToolCall, ToolDefinition, ToolResult, ToolSet};
