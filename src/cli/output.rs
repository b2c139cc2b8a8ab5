//! Output formatting for CLI commands.

use crate::agent::message::{ConversationTurn, Sender};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name. Unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` for JSON output, with a trailing newline.
    #[must_use]
    pub fn to_json<T: serde::Serialize>(self, value: &T) -> String {
        let mut out = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
        out.push('\n');
        out
    }
}

/// Formats a transcript.
#[must_use]
pub fn format_history(session_id: &str, turns: &[ConversationTurn], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!("Session {session_id} ({} turns)\n\n", turns.len());
            for turn in turns {
                let who = match turn.sender {
                    Sender::User => "user",
                    Sender::Bot => "bot ",
                };
                for (i, line) in turn.text.lines().enumerate() {
                    let prefix = if i == 0 { who } else { "    " };
                    out.push_str(prefix);
                    out.push_str("  ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            out
        }
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "session_id": session_id,
            "messages": turns,
        })),
    }
}
