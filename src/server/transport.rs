//! Listener setup and graceful shutdown.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{AppState, router};
use crate::error::ServerError;

/// Binds `host:port` and serves until Ctrl-C.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound, or
/// [`ServerError::Serve`] if the server loop fails.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<(), ServerError> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let ct = CancellationToken::new();
    let on_signal = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            on_signal.cancel();
        }
    });

    info!(addr, "chatbridge listening");
    serve_listener(listener, state, ct).await
}

/// Serves on an already bound listener until `shutdown` is cancelled.
///
/// In-flight streams are allowed to finish.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the server loop fails.
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
