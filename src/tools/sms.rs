//! Owner notification over SMS.
//!
//! `notify_owner_sms` texts the business owner and defers its result until
//! the owner answers through the inbound webhook. The pending record in the
//! [`PendingReplyStore`] is the rendezvous point between the two.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::agent::executor::{PendingReply, ToolContext, ToolHandler, ToolOutcome};
use crate::agent::tool::ToolDefinition;
use crate::error::{AgentError, SmsError, StorageError};
use crate::storage::PendingReplyStore;

/// Name the model uses to call the tool.
pub const SMS_TOOL_NAME: &str = "notify_owner_sms";

/// Maximum characters per outgoing SMS body.
const MAX_SMS_CHARS: usize = 1500;

/// Twilio REST API base.
const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Acknowledgement returned when the SMS went out.
const SENT_ACK: &str = "SMS sent successfully. Waiting for owner's reply...";

/// Returned when the request carries no session to bind the reply to.
const NO_SESSION_MESSAGE: &str = "Owner notification requires a chat session. Please ask the user for their contact information instead.";

const TOOL_DESCRIPTION: &str = "Send an SMS message to the business owner for real-time input during the conversation. Use this tool when:
- You have qualified a lead and want to notify the owner
- You need human guidance or specific information only the owner can provide
- The user has a question that requires the owner's direct input

The conversation will pause until the owner replies via SMS. Include all relevant context in your message so the owner can respond effectively. Keep messages concise but informative.";

/// Twilio credentials and phone numbers.
#[derive(Clone)]
pub struct TwilioConfig {
    /// Account SID.
    pub account_sid: String,
    /// Auth token, also used to verify webhook signatures.
    pub auth_token: String,
    /// Sending number.
    pub from_number: String,
    /// Owner's number.
    pub owner_number: String,
    /// Public URL Twilio posts inbound messages to; enables signature checks.
    pub webhook_url: Option<String>,
    /// REST API base (overridable for tests and proxies).
    pub api_base: String,
}

impl TwilioConfig {
    /// Reads `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`,
    /// `OWNER_PHONE_NUMBER` and optional `TWILIO_WEBHOOK_URL`.
    ///
    /// Returns `None` unless all four required values are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            account_sid: var("TWILIO_ACCOUNT_SID")?,
            auth_token: var("TWILIO_AUTH_TOKEN")?,
            from_number: var("TWILIO_PHONE_NUMBER")?,
            owner_number: var("OWNER_PHONE_NUMBER")?,
            webhook_url: var("TWILIO_WEBHOOK_URL"),
            api_base: TWILIO_API_BASE.to_string(),
        })
    }

    /// Checks that both phone numbers are in E.164 format.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError::NotConfigured`] naming the offending variable.
    pub fn validate(&self) -> Result<(), SmsError> {
        let e164 = Regex::new(r"^\+[1-9]\d{1,14}$")
            .map_err(|e| SmsError::NotConfigured(e.to_string()))?;
        for (name, number) in [
            ("TWILIO_PHONE_NUMBER", &self.from_number),
            ("OWNER_PHONE_NUMBER", &self.owner_number),
        ] {
            if !e164.is_match(number) {
                return Err(SmsError::NotConfigured(format!(
                    "{name} must be in E.164 format, got '{number}'"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("owner_number", &self.owner_number)
            .field("webhook_url", &self.webhook_url)
            .finish_non_exhaustive()
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsReceipt {
    /// Whether the provider accepted the message.
    pub success: bool,
    /// Provider message id.
    pub sid: Option<String>,
    /// Failure reason.
    pub error: Option<String>,
}

/// Outbound SMS transport.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Sends `body` to `to`. Failures are reported in the receipt.
    async fn send(&self, to: &str, body: &str) -> SmsReceipt;
}

/// Twilio REST client.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError::NotConfigured`] for malformed phone numbers and
    /// [`SmsError::Http`] if the HTTP client cannot be built.
    pub fn new(config: TwilioConfig) -> Result<Self, SmsError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }

    async fn try_send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        );
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(SmsError::Api {
                message: payload["message"]
                    .as_str()
                    .unwrap_or("Failed to send SMS")
                    .to_string(),
                status: status.as_u16(),
            });
        }
        Ok(payload["sid"].as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> SmsReceipt {
        match self.try_send(to, body).await {
            Ok(sid) => SmsReceipt {
                success: true,
                sid: Some(sid),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Twilio send failed");
                SmsReceipt {
                    success: false,
                    sid: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Input the model provides.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SmsNotifyInput {
    /// The message to send to the business owner. Include context about the user, their question or need, and what kind of response would be helpful.
    pub message: String,
    /// Brief summary of the conversation context for reference (e.g., "User asking about pricing for enterprise plan")
    #[serde(default)]
    pub context_summary: Option<String>,
}

/// Builds the SMS body: optional `[summary]` header, clamped to the SMS
/// length limit.
#[must_use]
pub fn format_owner_message(message: &str, context_summary: Option<&str>) -> String {
    let full = match context_summary.filter(|s| !s.is_empty()) {
        Some(summary) => format!("[{summary}]\n\n{message}"),
        None => message.to_string(),
    };

    if full.chars().count() > MAX_SMS_CHARS {
        let mut clamped: String = full.chars().take(MAX_SMS_CHARS - 3).collect();
        clamped.push_str("...");
        clamped
    } else {
        full
    }
}

fn input_schema() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(SmsNotifyInput))
        .unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

fn storage_failure(e: &StorageError) -> AgentError {
    AgentError::ToolExecution {
        name: SMS_TOOL_NAME.to_string(),
        message: e.to_string(),
    }
}

/// The `notify_owner_sms` tool.
pub struct SmsNotifyTool {
    sender: Arc<dyn SmsSender>,
    store: Arc<dyn PendingReplyStore>,
    owner_number: String,
}

impl SmsNotifyTool {
    /// Creates the tool.
    pub fn new(
        sender: Arc<dyn SmsSender>,
        store: Arc<dyn PendingReplyStore>,
        owner_number: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            store,
            owner_number: owner_number.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for SmsNotifyTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SMS_TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            input_schema: input_schema(),
        }
    }

    async fn call(&self, input: &Value, ctx: ToolContext<'_>) -> Result<ToolOutcome, AgentError> {
        let input: SmsNotifyInput =
            serde_json::from_value(input.clone()).map_err(|e| AgentError::ToolExecution {
                name: SMS_TOOL_NAME.to_string(),
                message: format!("invalid input: {e}"),
            })?;

        let Some(session_id) = ctx.session_id else {
            return Ok(ToolOutcome::failed(NO_SESSION_MESSAGE));
        };

        let body = format_owner_message(&input.message, input.context_summary.as_deref());
        let context = input
            .context_summary
            .as_ref()
            .map(|summary| json!({ "summary": summary }));

        let record = self
            .store
            .create_pending(session_id, ctx.invocation_id, &input.message, context)
            .await
            .map_err(|e| storage_failure(&e))?;

        let receipt = self.sender.send(&self.owner_number, &body).await;
        if !receipt.success {
            let reason = receipt
                .error
                .unwrap_or_else(|| "Failed to send SMS".to_string());
            if let Err(e) = self.store.mark_timed_out(session_id).await {
                warn!(session_id, error = %e, "failed to close pending request");
            }
            return Ok(ToolOutcome::failed(format!("Failed to send SMS: {reason}")));
        }

        info!(
            session_id,
            pending_id = record.id,
            sid = receipt.sid.as_deref().unwrap_or_default(),
            "owner notified"
        );
        Ok(ToolOutcome::Deferred {
            result: SENT_ACK.to_string(),
            reply: Box::new(SessionReply {
                store: Arc::clone(&self.store),
                session_id: session_id.to_string(),
            }),
        })
    }
}

/// Reply slot bound to one chat session.
pub struct SessionReply {
    store: Arc<dyn PendingReplyStore>,
    session_id: String,
}

impl SessionReply {
    /// Binds a reply slot to `session_id`.
    pub fn new(store: Arc<dyn PendingReplyStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl PendingReply for SessionReply {
    async fn check(&self) -> Result<Option<String>, AgentError> {
        self.store
            .check_reply(&self.session_id)
            .await
            .map_err(|e| storage_failure(&e))
    }

    async fn clear(&self) -> Result<(), AgentError> {
        self.store
            .clear_reply(&self.session_id)
            .await
            .map_err(|e| storage_failure(&e))
    }

    async fn expire(&self) -> Result<(), AgentError> {
        self.store
            .mark_timed_out(&self.session_id)
            .await
            .map_err(|e| storage_failure(&e))
    }

    async fn finish(&self) -> Result<(), AgentError> {
        self.store
            .mark_closed(&self.session_id)
            .await
            .map_err(|e| storage_failure(&e))
    }
}
