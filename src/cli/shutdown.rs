//! Shutdown coordination for graceful termination, and the SIGHUP hook for
//! reloading the route file without tearing anything down.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wraps the process-wide [`CancellationToken`]. Every long-running task
/// (accept loop, discovery adapter, down-scaler) is handed a clone of
/// `token()` and races it in a `tokio::select!`.
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
        })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self, reason: &str) {
        if self.token.is_cancelled() {
            return;
        }
        info!(reason, "initiating shutdown");
        self.token.cancel();
    }

    /// Installs SIGINT/SIGTERM handlers that trigger shutdown, and a SIGHUP
    /// handler that calls `on_reload` without affecting the token. Runs
    /// until the token is cancelled.
    pub fn spawn_signal_handlers(self: &Arc<Self>, on_reload: impl Fn() + Send + Sync + 'static) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sighup = match signal(SignalKind::hangup()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGHUP handler");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = this.token.cancelled() => return,
                    _ = tokio::signal::ctrl_c() => {
                        this.trigger("SIGINT");
                        return;
                    }
                    _ = sigterm.recv() => {
                        this.trigger("SIGTERM");
                        return;
                    }
                    _ = sighup.recv() => {
                        info!("received SIGHUP, reloading routes");
                        on_reload();
                    }
                }
            }
        });
    }
}
