// Graceful shutdown for the admin binary.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded")]
pub struct TimeoutError;

/// Waits for an OS signal (or an explicit cancel), then gives the cleanup
/// worker a bounded amount of time to stop.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_token: CancellationToken,
    timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(shutdown_token: CancellationToken, timeout: Duration) -> Self {
        Self {
            shutdown_token,
            timeout,
        }
    }

    /// Resolves on SIGINT, SIGTERM or cancellation of the token, and cancels
    /// the token in every case.
    pub async fn await_signal(&self) {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGINT", "cancellation started");
            }
            _ = terminate() => {
                info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGTERM", "cancellation started");
            }
            _ = self.shutdown_token.cancelled() => {
                info!(component = "graceful-shutdown", event = "ctx_done", "cancellation started");
            }
        }
        self.shutdown_token.cancel();
    }

    /// Runs `stop` to completion unless the graceful timeout expires first.
    pub async fn finish<F>(&self, stop: F) -> Result<(), TimeoutError>
    where
        F: Future<Output = ()>,
    {
        match timeout(self.timeout, stop).await {
            Ok(()) => {
                info!(component = "graceful-shutdown", event = "shutdown_success", "service was gracefully shut down");
                Ok(())
            }
            Err(_) => {
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "cleanup worker did not stop within timeout"
                );
                Err(TimeoutError)
            }
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!(component = "graceful-shutdown", error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
