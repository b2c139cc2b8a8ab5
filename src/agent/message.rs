//! Conversation and provider message types.
//!
//! [`ConversationTurn`] is what the widget sends and what gets persisted.
//! [`ModelMessage`] is the richer provider-facing form carrying tool-use and
//! tool-result blocks, which only live for the duration of one request.

use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolDefinition, ToolResult};

/// Who authored a persisted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The widget visitor.
    User,
    /// The assistant.
    Bot,
}

/// One persisted chat turn, in the widget's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Author of the turn.
    pub sender: Sender,
    /// Turn text.
    pub text: String,
}

impl ConversationTurn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    /// Creates a bot turn.
    #[must_use]
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
        }
    }
}

/// Role of a provider-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input, including tool results.
    User,
    /// Model output, including tool-use requests.
    Assistant,
}

/// A content block inside a [`ModelMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// The model asks for a tool invocation.
    ToolUse(ToolCall),
    /// Result of a tool invocation, sent back to the model.
    ToolResult(ToolResult),
}

/// A provider-facing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Message role.
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    /// Creates a user text message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Creates an assistant text message.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Creates an assistant message echoing the blocks the model produced
    /// (text preamble plus tool-use requests).
    #[must_use]
    pub const fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Creates the user-role message carrying all tool results of a round.
    #[must_use]
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        }
    }

    /// Concatenated text of all text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }
}

/// A provider-agnostic completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Model identifier.
    pub model: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// System prompt.
    pub system: String,
    /// Ordered conversation.
    pub messages: Vec<ModelMessage>,
    /// Tools offered to the model. Providers omit the field when empty.
    pub tools: Vec<ToolDefinition>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of turn.
    EndTurn,
    /// The model wants tool results before continuing.
    ToolUse,
    /// Output token limit reached.
    MaxTokens,
    /// Any other provider-specific reason.
    Other(String),
}

impl StopReason {
    /// Parses a provider stop reason string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "end_turn" | "stop" | "stop_sequence" => Self::EndTurn,
            "tool_use" | "tool_calls" => Self::ToolUse,
            "max_tokens" | "length" => Self::MaxTokens,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token usage statistics from a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens generated in the completion.
    pub output_tokens: u32,
}

/// A provider-agnostic completion response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Text and tool-use blocks, in the order the model produced them.
    pub content: Vec<ContentBlock>,
    /// Token usage.
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Concatenated text of all text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }

    /// Tool-use requests, in request order.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Returns `true` when the model stopped to request tools and actually
    /// included at least one tool-use block.
    #[must_use]
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
            && self
                .content
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolUse(_)))
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Projects persisted history plus the new user message into the provider
/// message list.
#[must_use]
pub fn project_history(history: &[ConversationTurn], message: &str) -> Vec<ModelMessage> {
    history
        .iter()
        .map(|turn| match turn.sender {
            Sender::User => ModelMessage::user_text(&turn.text),
            Sender::Bot => ModelMessage::assistant_text(&turn.text),
        })
        .chain(std::iter::once(ModelMessage::user_text(message)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_history_appends_user_message() {
        let history = vec![ConversationTurn::user("hi"), ConversationTurn::bot("hello")];
        let messages = project_history(&history, "how are you?");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text(), "hello");
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].text(), "how are you?");
    }

    #[test]
    fn test_project_empty_history() {
        let messages = project_history(&[], "hi");
        assert_eq!(messages, vec![ModelMessage::user_text("hi")]);
    }

    #[test]
    fn test_turn_wire_format() {
        let json = serde_json::to_value(ConversationTurn::bot("Hello!")).unwrap_or_default();
        assert_eq!(json, json!({"sender": "bot", "text": "Hello!"}));

        let turn: ConversationTurn =
            serde_json::from_value(json!({"sender": "user", "text": "hi"}))
                .unwrap_or_else(|_| unreachable!());
        assert_eq!(turn, ConversationTurn::user("hi"));
    }

    #[test]
    fn test_content_block_serialization() {
        let message = ModelMessage::tool_results(vec![ToolResult::error("toolu_1", "boom")]);
        let json = serde_json::to_value(&message).unwrap_or_default();
        assert_eq!(
            json,
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": "boom",
                    "is_error": true
                }]
            })
        );
    }

    #[test]
    fn test_response_text_and_tool_calls() {
        let response = ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![
                ContentBlock::Text {
                    text: "Let me check. ".to_string(),
                },
                ContentBlock::ToolUse(ToolCall {
                    id: "toolu_1".to_string(),
                    name: "notify_owner_sms".to_string(),
                    input: json!({"message": "hi"}),
                }),
                ContentBlock::Text {
                    text: "One moment.".to_string(),
                },
            ],
            usage: TokenUsage::default(),
        };
        assert_eq!(response.text(), "Let me check. One moment.");
        assert_eq!(response.tool_calls().len(), 1);
        assert!(response.wants_tools());
    }

    #[test]
    fn test_tool_use_without_blocks_is_not_a_tool_round() {
        let response = ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![ContentBlock::Text {
                text: "hmm".to_string(),
            }],
            usage: TokenUsage::default(),
        };
        assert!(!response.wants_tools());
    }

    #[test]
    fn test_stop_reason_parse() {
        assert_eq!(StopReason::parse("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::parse("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::parse("length"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::parse("refusal"),
            StopReason::Other("refusal".to_string())
        );
    }
}
