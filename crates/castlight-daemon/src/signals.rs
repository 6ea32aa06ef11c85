//! Signal handling for session cancellation.

use anyhow::{Context, Result};
use castlight_hid::CancelToken;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// Both handlers are registered before this returns, so a signal that
/// arrives while the session is starting is not missed.
pub fn cancel_on_shutdown(token: CancelToken) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        info!(signal = name, "Shutdown requested, abandoning lighting session");
        token.cancel();
    });
    Ok(())
}
