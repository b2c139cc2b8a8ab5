//! System prompt and the fixed texts the orchestrator folds into a round.
//!
//! The system prompt is loaded from a template file when available, falling
//! back to the compiled-in default. The remaining texts are the widget-facing
//! notices and the tool-result wrappers built around owner replies.

use std::path::{Path, PathBuf};

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Be friendly, concise, and helpful.

Guidelines:
- Keep responses brief (1-3 sentences when possible)
- Be conversational and approachable
- If you don't know something, be honest about it
- Ask clarifying questions when needed";

/// Notice streamed while a deferred tool waits on the owner.
pub const WAITING_MESSAGE: &str = "Checking with a team member...";

/// Generic message of the terminal error event.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Error-flagged tool result used when no owner reply arrived.
pub const NO_REPLY_FALLBACK: &str = "No reply received from owner. Please ask the user to leave their contact information or check back later.";

/// Streamed when the tool-round limit is exhausted before a final answer.
pub const ROUND_LIMIT_FALLBACK: &str = "I'm sorry, I wasn't able to finish answering that. Could you try asking again, or leave your contact information so someone can follow up?";

/// Separator between consecutive owner replies.
const REPLY_SEPARATOR: &str = "\n---\n";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/chatbridge/prompts";

/// Filename of the system prompt template.
const SYSTEM_FILENAME: &str = "system.md";

/// Prompts used by the orchestrator.
///
/// Use [`PromptSet::load`] to resolve the prompt directory from CLI flags,
/// environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt sent with every model call.
    pub system: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in
    /// defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir`)
    /// 2. `CHATBRIDGE_PROMPT_DIR` environment variable
    /// 3. `~/.config/chatbridge/prompts/`
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("CHATBRIDGE_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let system = resolved_dir
            .map(|dir| dir.join(SYSTEM_FILENAME))
            .and_then(|path| std::fs::read_to_string(path).ok())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Self { system }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Uses `system` as the system prompt.
    #[must_use]
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path, force: bool) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        let path = dir.join(SYSTEM_FILENAME);
        if force || !path.exists() {
            std::fs::write(&path, DEFAULT_SYSTEM_PROMPT)?;
            written.push(path);
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the tool result carrying owner replies back to the model.
///
/// The replies are wrapped in an internal block so the model phrases its
/// own answer instead of quoting the owner.
///
/// `signal` is the finalize keyword when the owner ended the wait with it.
#[must_use]
pub fn build_owner_instructions(replies: &[String], signal: Option<&str>) -> String {
    let instructions = replies.join(REPLY_SEPARATOR);
    let signal = signal
        .map(|keyword| format!("Owner has signaled {keyword}. "))
        .unwrap_or_default();

    format!(
        "[INTERNAL - DO NOT SHARE WITH VISITOR]\n\
         Owner instructions:\n{instructions}\n\n\
         {signal}Formulate a natural response to the visitor based on these instructions. \
         Do not reveal what the owner said."
    )
}
