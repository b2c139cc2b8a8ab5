//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::client::create_provider;
use crate::agent::config::ChatConfig;
use crate::agent::executor::ToolGateway;
use crate::agent::orchestrator::Orchestrator;
use crate::agent::prompt::PromptSet;
use crate::cli::output::{OutputFormat, format_history};
use crate::cli::parser::{Cli, Commands};
use crate::error::{AgentError, CommandError, Result, StorageError};
use crate::server::{AppState, WebhookAuth, serve};
use crate::storage::SqliteStorage;
use crate::tools::{TwilioConfig, build_gateway};

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Serve {
            host,
            port,
            prompt_dir,
        } => cmd_serve(&db_path, host, *port, prompt_dir.as_deref()),
        Commands::History { session_id } => cmd_history(&db_path, session_id, format),
        Commands::InitPrompts { dir, force } => cmd_init_prompts(dir.as_deref(), *force, format),
    }
}

/// Opens storage and ensures it's initialized.
fn open_storage(db_path: &Path) -> Result<SqliteStorage> {
    let storage = SqliteStorage::open(db_path)?;

    if !storage.is_initialized()? {
        return Err(StorageError::NotInitialized.into());
    }

    Ok(storage)
}

// ==================== Command Implementations ====================

fn cmd_init(db_path: &Path, force: bool, format: OutputFormat) -> Result<String> {
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to create directory: {e}"))
        })?;
    }

    if force && db_path.exists() {
        std::fs::remove_file(db_path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to remove existing database: {e}"))
        })?;
    }

    let storage = SqliteStorage::open(db_path)?;
    storage.init()?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Initialized chatbridge database at: {}\n",
            db_path.display()
        )),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "success": true,
            "path": db_path.to_string_lossy(),
            "force": force
        }))),
    }
}

fn cmd_history(db_path: &Path, session_id: &str, format: OutputFormat) -> Result<String> {
    let storage = open_storage(db_path)?;
    let turns = storage
        .load_chat(session_id)?
        .ok_or_else(|| StorageError::NotFound {
            entity: "chat",
            id: session_id.to_string(),
        })?;
    Ok(format_history(session_id, &turns, format))
}

fn cmd_init_prompts(dir: Option<&Path>, force: bool, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir, force).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text if written.is_empty() => Ok(format!(
            "All prompt templates already exist in: {}\n",
            target_dir.display()
        )),
        OutputFormat::Text => {
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown"),
                );
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize the assistant's system prompt.\n");
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "directory": target_dir.to_string_lossy(),
            "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
            "count": written.len()
        }))),
    }
}

/// Builds the orchestrator from the environment. A missing API key leaves
/// the server running without chat; any other configuration error aborts.
fn build_orchestrator(
    prompt_dir: Option<&Path>,
    twilio: Option<&TwilioConfig>,
    storage: &Arc<SqliteStorage>,
) -> Result<Option<Arc<Orchestrator>>> {
    let mut builder = ChatConfig::builder().from_env();
    if let Some(dir) = prompt_dir {
        builder = builder.prompt_dir(dir);
    }

    let config = match builder.build() {
        Ok(config) => config,
        Err(AgentError::ApiKeyMissing) => {
            warn!("no API key configured; /api/chat will answer 500");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let provider = create_provider(&config)?;
    let tools = build_gateway(twilio, storage.clone())?;
    info!(
        provider = provider.name(),
        model = config.model,
        tools = tools.tool_set().len(),
        "chat service configured"
    );

    Ok(Some(Arc::new(
        Orchestrator::new(provider, config)
            .with_tools(Arc::new(tools))
            .with_store(storage.clone()),
    )))
}

/// Starts the HTTP server and blocks until it shuts down.
fn cmd_serve(db_path: &Path, host: &str, port: u16, prompt_dir: Option<&Path>) -> Result<String> {
    let storage = Arc::new(open_storage(db_path)?);
    let twilio = TwilioConfig::from_env();
    let orchestrator = build_orchestrator(prompt_dir, twilio.as_ref(), &storage)?;

    let webhook = twilio.as_ref().and_then(|t| {
        t.webhook_url.clone().map(|url| WebhookAuth {
            auth_token: t.auth_token.clone(),
            url,
        })
    });
    if twilio.is_some() && webhook.is_none() {
        warn!("TWILIO_WEBHOOK_URL not set; webhook signatures will not be checked");
    }

    let state = AppState {
        orchestrator,
        chats: storage.clone(),
        pending: storage,
        webhook,
    };

    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;
    rt.block_on(serve(state, host, port))?;

    Ok(String::new())
}
