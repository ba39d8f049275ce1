//! Ctrl+C / SIGTERM handling for the poll loop.

use std::future::Future;

use anyhow::Result;

/// Register the interrupt handlers now and return a future that resolves on
/// the first signal. Registration happens before anything is polled, so a
/// signal that arrives mid-cycle is caught and the loop exits after persisting.
#[cfg(unix)]
pub fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    use anyhow::Context;
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });
    Ok(async move {
        // Sender dropped means the listener failed; never shut down on that.
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    })
}
