use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Cancels `token` on the first `Ctrl+C` or `SIGTERM`.
///
/// A handler that cannot be installed is logged and ignored; the other one
/// keeps working.
pub async fn cancel_on_shutdown(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            core::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = token.cancelled() => return,
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, stopping pipeline...");
    token.cancel();
}
