//! # chatbridge
//!
//! Backend for an embeddable chat widget. Answers stream to the browser as
//! server-sent events while an agentic loop lets the model call tools,
//! including `notify_owner_sms`, which texts the business owner and folds
//! their reply back into the conversation.
//!
//! ## Modules
//!
//! - [`agent`]: orchestrator, providers, tool gateway and reply wait
//! - [`tools`]: the SMS tool and inbound webhook helpers
//! - [`storage`]: `SQLite` persistence for transcripts and pending requests
//! - [`server`]: axum routes and listener
//! - [`cli`]: the `chatbridge` command line
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatbridge::agent::{ChatConfig, ChatRequest, Orchestrator, create_provider};
//! use futures_util::StreamExt;
//!
//! # async fn demo() -> chatbridge::Result<()> {
//! let config = ChatConfig::from_env()?;
//! let provider = create_provider(&config)?;
//! let orchestrator = Arc::new(Orchestrator::new(provider, config));
//!
//! let mut events = orchestrator.stream(ChatRequest::new("hi"));
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_frame());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod error;
pub mod server;
pub mod storage;
pub mod tools;

pub use error::{Error, Result};
