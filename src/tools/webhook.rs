//! Inbound SMS webhook helpers: Twilio request signatures and form parsing.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Empty TwiML document; tells Twilio not to answer the sender.
pub const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>";

/// Computes the signature Twilio sends for a POST to `url` with `params`.
///
/// The signed payload is the full URL followed by every parameter name and
/// value, sorted by name.
#[must_use]
pub fn compute_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let mut mac = match HmacSha1::new_from_slice(auth_token.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(signed_payload(url, params).as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Checks `signature` against the expected value in constant time.
#[must_use]
pub fn validate_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &BTreeMap<String, String>,
) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload(url, params).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn signed_payload(url: &str, params: &BTreeMap<String, String>) -> String {
    params.iter().fold(url.to_string(), |mut acc, (k, v)| {
        acc.push_str(k);
        acc.push_str(v);
        acc
    })
}

/// Decodes an `application/x-www-form-urlencoded` body. Repeated keys keep
/// the last value.
#[must_use]
pub fn parse_webhook_body(body: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

/// The fields of an inbound message we act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookMessage {
    /// Sender number.
    pub from: Option<String>,
    /// Message text, trimmed.
    pub body: String,
    /// Provider message id.
    pub message_sid: Option<String>,
}

impl WebhookMessage {
    /// Extracts the message from webhook parameters. `None` when the body is
    /// missing or blank.
    #[must_use]
    pub fn from_params(params: &BTreeMap<String, String>) -> Option<Self> {
        let body = params.get("Body").map(|b| b.trim()).filter(|b| !b.is_empty())?;
        Some(Self {
            from: params.get("From").cloned(),
            body: body.to_string(),
            message_sid: params.get("MessageSid").cloned(),
        })
    }
}
