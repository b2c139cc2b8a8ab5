//! Chat configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use super::reply_wait::{ReplyPolicy, WaitOptions};
use crate::error::AgentError;

/// Default provider.
const DEFAULT_PROVIDER: &str = "anthropic";
/// Default model.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
/// Default model when the `openai` provider is selected.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default max output tokens per model call.
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Default limit on model calls per request.
const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;
/// Default sleep between reply checks, in milliseconds.
const DEFAULT_REPLY_CHECK_INTERVAL_MS: u64 = 2_000;
/// Default reply deadline, in milliseconds.
const DEFAULT_REPLY_TIMEOUT_MS: u64 = 300_000;
/// Default graphemes per streamed text event.
const DEFAULT_CHUNK_SIZE: usize = 20;
/// Default pause between streamed text events.
const DEFAULT_CHUNK_DELAY_MS: u64 = 10;
/// Default HTTP timeout for provider calls, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default capacity of the per-request event channel.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Configuration for the chat orchestrator and its provider.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// LLM provider name (`"anthropic"` or `"openai"`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Maximum output tokens per model call.
    pub max_tokens: u32,
    /// Explicit system prompt. When unset the prompt set is loaded from
    /// [`ChatConfig::prompt_dir`].
    pub system_prompt: Option<String>,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<PathBuf>,
    /// Upper bound on model calls per request.
    pub max_tool_rounds: usize,
    /// Sleep between checks while waiting on an external reply.
    pub reply_check_interval: Duration,
    /// Deadline for an external reply.
    pub reply_timeout: Duration,
    /// How owner replies end a wait.
    pub reply_policy: ReplyPolicy,
    /// Graphemes per streamed text event.
    pub chunk_size: usize,
    /// Pause between streamed text events.
    pub chunk_delay: Duration,
    /// Forward provider token deltas directly when no tools are configured.
    pub token_streaming: bool,
    /// Stream an apology when the round limit is exhausted without an answer.
    pub round_limit_fallback: bool,
    /// HTTP timeout for provider calls.
    pub timeout: Duration,
    /// Capacity of the per-request event channel.
    pub event_buffer: usize,
}

impl ChatConfig {
    /// Creates a new builder for `ChatConfig`.
    #[must_use]
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Reply-wait settings derived from this configuration.
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            interval: self.reply_check_interval,
            timeout: self.reply_timeout,
            policy: self.reply_policy.clone(),
        }
    }
}

/// Builder for [`ChatConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChatConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    prompt_dir: Option<PathBuf>,
    max_tool_rounds: Option<usize>,
    reply_check_interval: Option<Duration>,
    reply_timeout: Option<Duration>,
    reply_policy: Option<ReplyPolicy>,
    chunk_size: Option<usize>,
    chunk_delay: Option<Duration>,
    token_streaming: Option<bool>,
    round_limit_fallback: Option<bool>,
    timeout: Option<Duration>,
    event_buffer: Option<usize>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl ChatConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CHATBRIDGE_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            let vendor_key = match self.provider.as_deref() {
                Some("openai") => "OPENAI_API_KEY",
                _ => "ANTHROPIC_API_KEY",
            };
            self.api_key = std::env::var(vendor_key)
                .or_else(|_| std::env::var("CHATBRIDGE_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("CHATBRIDGE_BASE_URL").ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("CHATBRIDGE_MODEL").ok();
        }
        if self.max_tokens.is_none() {
            self.max_tokens = env_parse("CHATBRIDGE_MAX_TOKENS");
        }
        if self.max_tool_rounds.is_none() {
            self.max_tool_rounds = env_parse("CHATBRIDGE_MAX_TOOL_ROUNDS");
        }
        if self.reply_check_interval.is_none() {
            self.reply_check_interval =
                env_parse("CHATBRIDGE_REPLY_CHECK_INTERVAL_MS").map(Duration::from_millis);
        }
        if self.reply_timeout.is_none() {
            self.reply_timeout =
                env_parse("CHATBRIDGE_REPLY_TIMEOUT_MS").map(Duration::from_millis);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("CHATBRIDGE_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the max output tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets an explicit system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the limit on model calls per request.
    #[must_use]
    pub const fn max_tool_rounds(mut self, n: usize) -> Self {
        self.max_tool_rounds = Some(n);
        self
    }

    /// Sets the sleep between reply checks.
    #[must_use]
    pub const fn reply_check_interval(mut self, interval: Duration) -> Self {
        self.reply_check_interval = Some(interval);
        self
    }

    /// Sets the reply deadline.
    #[must_use]
    pub const fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Sets the reply policy.
    #[must_use]
    pub fn reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.reply_policy = Some(policy);
        self
    }

    /// Sets the graphemes per streamed text event.
    #[must_use]
    pub const fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Sets the pause between streamed text events.
    #[must_use]
    pub const fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Enables token-level streaming for toolless requests.
    #[must_use]
    pub const fn token_streaming(mut self, enabled: bool) -> Self {
        self.token_streaming = Some(enabled);
        self
    }

    /// Enables or disables the round-limit apology.
    #[must_use]
    pub const fn round_limit_fallback(mut self, enabled: bool) -> Self {
        self.round_limit_fallback = Some(enabled);
        self
    }

    /// Sets the provider HTTP timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_buffer(mut self, n: usize) -> Self {
        self.event_buffer = Some(n);
        self
    }

    /// Builds the [`ChatConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, or
    /// [`AgentError::Config`] for a zero round limit or poll interval.
    pub fn build(self) -> Result<ChatConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        let max_tool_rounds = self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);
        if max_tool_rounds == 0 {
            return Err(AgentError::Config {
                message: "max_tool_rounds must be at least 1".to_string(),
            });
        }

        let reply_check_interval = self
            .reply_check_interval
            .unwrap_or(Duration::from_millis(DEFAULT_REPLY_CHECK_INTERVAL_MS));
        if reply_check_interval.is_zero() {
            return Err(AgentError::Config {
                message: "reply_check_interval must be greater than zero".to_string(),
            });
        }

        let provider = self
            .provider
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let model = self.model.unwrap_or_else(|| {
            match provider.as_str() {
                "openai" => DEFAULT_OPENAI_MODEL,
                _ => DEFAULT_MODEL,
            }
            .to_string()
        });

        Ok(ChatConfig {
            provider,
            api_key,
            base_url: self.base_url,
            model,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system_prompt: self.system_prompt,
            prompt_dir: self.prompt_dir,
            max_tool_rounds,
            reply_check_interval,
            reply_timeout: self
                .reply_timeout
                .unwrap_or(Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS)),
            reply_policy: self.reply_policy.unwrap_or_default(),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            chunk_delay: self
                .chunk_delay
                .unwrap_or(Duration::from_millis(DEFAULT_CHUNK_DELAY_MS)),
            token_streaming: self.token_streaming.unwrap_or(false),
            round_limit_fallback: self.round_limit_fallback.unwrap_or(true),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            event_buffer: self.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER).max(1),
        })
    }
}
