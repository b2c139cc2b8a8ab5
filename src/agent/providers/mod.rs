//! Concrete [`LlmProvider`](super::provider::LlmProvider) backends.

mod anthropic;
#[cfg(feature = "openai")]
mod openai;

pub use anthropic::AnthropicProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
