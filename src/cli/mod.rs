//! CLI layer for chatbridge.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing the database, running the server and inspecting chats.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
