use anyhow::{anyhow, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal::unix::{signal, SignalKind};

/// Signal types that can trigger shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM - Docker/Kubernetes graceful shutdown
    Terminate,
    /// SIGINT - Ctrl+C interactive shutdown
    Interrupt,
    /// SIGQUIT - Quit signal
    Quit,
    /// The chain runner stopped on its own, e.g. after a configuration error
    Internal,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Quit => write!(f, "SIGQUIT"),
            ShutdownSignal::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Signal handler for graceful shutdown
///
/// Cancelling the token returned by [`SignalHandler::shutdown_token`] stops every
/// worker; the token is also cancelled from the inside to request an internal shutdown.
pub struct SignalHandler {
    shutdown_signal: Option<ShutdownSignal>,
    shutdown_token: CancellationToken,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self { shutdown_signal: None, shutdown_token: CancellationToken::new() }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Wait for any shutdown signal and return which one was received
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        let signal = self.wait_for_signal().await;
        self.shutdown_signal = Some(signal);
        info!(signal = %signal, "Received shutdown signal");
        signal
    }

    pub fn shutdown_signal(&self) -> Option<ShutdownSignal> {
        self.shutdown_signal
    }

    #[cfg(unix)]
    async fn wait_for_signal(&self) -> ShutdownSignal {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT handler");
        let mut sigquit = signal(SignalKind::quit()).expect("Failed to create SIGQUIT handler");

        info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGQUIT and internal shutdown requests");

        tokio::select! {
            _ = sigterm.recv() => ShutdownSignal::Terminate,
            _ = sigint.recv() => ShutdownSignal::Interrupt,
            _ = sigquit.recv() => {
                warn!("Force quit signal received (SIGQUIT)");
                ShutdownSignal::Quit
            }
            _ = self.shutdown_token.cancelled() => {
                warn!("Internal shutdown requested");
                ShutdownSignal::Internal
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_signal(&self) -> ShutdownSignal {
        info!("Signal handler initialized, listening for Ctrl+C and internal shutdown requests");

        tokio::select! {
            _ = signal::ctrl_c() => ShutdownSignal::Interrupt,
            _ = self.shutdown_token.cancelled() => {
                warn!("Internal shutdown requested");
                ShutdownSignal::Internal
            }
        }
    }

    /// Cancel the shutdown token and wait for `shutdown_fn` to finish within `timeout_secs`
    pub async fn handle_graceful_shutdown<F, Fut>(&self, shutdown_fn: F, timeout_secs: u64) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let signal = self.shutdown_signal.unwrap_or(ShutdownSignal::Interrupt);
        info!(signal = %signal, timeout_secs, "Starting graceful shutdown");
        self.shutdown_token.cancel();

        match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), shutdown_fn()).await {
            Ok(Ok(())) => {
                info!("Graceful shutdown completed successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Graceful shutdown failed");
                Err(e)
            }
            Err(_) => {
                error!(timeout_secs, "Graceful shutdown timed out");
                match signal {
                    ShutdownSignal::Quit => {
                        warn!("SIGQUIT received - forcing immediate exit");
                        std::process::exit(1);
                    }
                    _ => {
                        warn!("Shutdown timeout reached - in-flight import state merges may be lost");
                        Err(anyhow!("Shutdown timeout exceeded"))
                    }
                }
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
