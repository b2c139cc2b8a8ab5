//! Tools offered to the model and the inbound side of the SMS round trip.

pub mod sms;
pub mod webhook;

use std::sync::Arc;

use tracing::info;

pub use sms::{
    SMS_TOOL_NAME, SessionReply, SmsNotifyInput, SmsNotifyTool, SmsReceipt, SmsSender,
    TwilioClient, TwilioConfig, format_owner_message,
};
pub use webhook::{WebhookMessage, parse_webhook_body, validate_signature};

use crate::agent::executor::ToolExecutor;
use crate::error::SmsError;
use crate::storage::PendingReplyStore;

/// Builds the deployment's tool registry. `notify_owner_sms` is registered
/// only when Twilio is configured; otherwise the registry is empty and chats
/// run without tools.
///
/// # Errors
///
/// Returns [`SmsError`] if the Twilio configuration is invalid.
pub fn build_gateway(
    twilio: Option<&TwilioConfig>,
    store: Arc<dyn PendingReplyStore>,
) -> Result<ToolExecutor, SmsError> {
    let Some(config) = twilio else {
        info!("Twilio not configured; owner notification disabled");
        return Ok(ToolExecutor::new());
    };

    let client = TwilioClient::new(config.clone())?;
    let tool = SmsNotifyTool::new(Arc::new(client), store, config.owner_number.clone());
    Ok(ToolExecutor::new().with_handler(Arc::new(tool)))
}
