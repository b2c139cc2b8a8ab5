use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`PendingRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Sent, waiting for the owner.
    Pending,
    /// The owner answered and the answer has not been consumed.
    Replied,
    /// The wait deadline passed.
    TimedOut,
    /// The wait finished with a reply; later texts no longer attach here.
    Closed,
}

impl PendingStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Replied => "replied",
            Self::TimedOut => "timed_out",
            Self::Closed => "closed",
        }
    }

    /// Parses the stored representation. Unknown values map to `TimedOut`
    /// so they are never picked up again.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "replied" => Self::Replied,
            "closed" => Self::Closed,
            _ => Self::TimedOut,
        }
    }
}

/// A request sent to the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Record id.
    pub id: String,
    /// Chat session that triggered the request.
    pub session_id: String,
    /// Tool invocation that triggered the request.
    pub tool_use_id: String,
    /// Text sent to the owner.
    pub message_sent: String,
    /// Owner reply, once received.
    pub reply: Option<String>,
    /// Lifecycle state.
    pub status: PendingStatus,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 reply time.
    pub replied_at: Option<String>,
    /// Extra context stored with the request.
    pub context: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(PendingStatus::Pending ; "pending")]
    #[test_case(PendingStatus::Replied ; "replied")]
    #[test_case(PendingStatus::TimedOut ; "timed out")]
    #[test_case(PendingStatus::Closed ; "closed")]
    fn test_status_roundtrip(status: PendingStatus) {
        assert_eq!(PendingStatus::parse(status.as_str()), status);
    }

    #[test]
    fn test_legacy_timeout_value() {
        assert_eq!(PendingStatus::parse("timeout"), PendingStatus::TimedOut);
    }
}
