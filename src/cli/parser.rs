//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chatbridge: chat widget backend with human-in-the-loop SMS.
///
/// Streams LLM answers to an embeddable chat widget and lets the model
/// text the business owner for input mid-conversation.
#[derive(Parser, Debug)]
#[command(name = "chatbridge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the database file.
    ///
    /// Defaults to `.chatbridge/chatbridge.db` in the current directory.
    #[arg(short, long, env = "CHATBRIDGE_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database.
    ///
    /// Creates the database file and schema if they don't exist.
    #[command(after_help = r#"Examples:
  chatbridge init                      # Initialize in current directory
  chatbridge init --force              # Re-initialize (destroys existing data)
  chatbridge --db-path ./chat.db init  # Initialize with custom path
"#)]
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Run the HTTP server.
    ///
    /// Serves `/api/chat`, `/api/chat/load`, `/api/sms/webhook` and
    /// `/health`. Provider and Twilio settings come from the environment
    /// (a `.env` file is honored).
    #[command(after_help = r#"Examples:
  chatbridge serve                          # Listen on 127.0.0.1:3000
  chatbridge serve --host 0.0.0.0 -p 8080   # Listen on all interfaces
  CHATBRIDGE_PROVIDER=openai chatbridge serve
"#)]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1", env = "CHATBRIDGE_HOST")]
        host: String,

        /// Port to bind.
        #[arg(short, long, default_value = "3000", env = "CHATBRIDGE_PORT")]
        port: u16,

        /// Directory containing `system.md`.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// Print a stored conversation.
    #[command(after_help = r#"Examples:
  chatbridge history 3f2a9c                 # Transcript as text
  chatbridge --format json history 3f2a9c   # Raw turns
"#)]
    History {
        /// Session ID.
        session_id: String,
    },

    /// Write the default system prompt template for customization.
    ///
    /// Creates `system.md` in the prompt directory. Existing files are left
    /// alone unless `--force` is given.
    InitPrompts {
        /// Target directory (default: `~/.config/chatbridge/prompts`).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Overwrite existing templates.
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Subcommand name as typed on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Serve { .. } => "serve",
            Self::History { .. } => "history",
            Self::InitPrompts { .. } => "init-prompts",
        }
    }
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::storage::DEFAULT_DB_PATH))
    }
}
