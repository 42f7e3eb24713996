// OS termination signals
//
// Unix: SIGINT, SIGTERM, SIGQUIT. Elsewhere: Ctrl-C.

use tokio_util::sync::CancellationToken;

/// Wait for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
        _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
        _ = sigquit.recv() => tracing::info!(signal = "SIGQUIT", "Shutdown signal received"),
    }
    Ok(())
}

/// Wait for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl_c", "Shutdown signal received");
    Ok(())
}

/// Cancel `token` once a termination signal arrives.
///
/// If signal handlers cannot be installed the token is cancelled right away.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
        token.cancel();
    })
}

