use tokio_util::sync::CancellationToken;
use tracing::info;

/// Listen for SIGTERM and SIGINT (Ctrl-C elsewhere).
///
/// The returned token is cancelled when either arrives. Handlers are
/// installed before returning, so a signal sent right after start-up is not
/// lost.
#[cfg(unix)]
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    use tokio::signal::unix::{SignalKind, signal};

    let token = CancellationToken::new();
    let token_clone = token.clone();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }

        token_clone.cancel();
    });

    Ok(token)
}

#[cfg(not(unix))]
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, initiating graceful shutdown");
            token_clone.cancel();
        }
    });

    Ok(token)
}
