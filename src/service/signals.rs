// Signal handling for graceful service shutdown

use crate::error::{Result, TrilaneError};
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};
use tracing::{info, warn};

/// Waits for SIGTERM or SIGINT
pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
}

impl SignalHandler {
    pub fn new() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate()).map_err(|e| TrilaneError::Io {
            source: e,
            context: "Failed to setup SIGTERM handler".to_string(),
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| TrilaneError::Io {
            source: e,
            context: "Failed to setup SIGINT handler".to_string(),
        })?;

        Ok(Self { sigterm, sigint })
    }

    /// Wait for a signal; returns its name
    pub async fn wait(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM");
                "terminate"
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT");
                "interrupt"
            }
        }
    }
}

/// Resolves when the process is asked to stop
pub async fn shutdown_signal() {
    match SignalHandler::new() {
        Ok(mut handler) => {
            handler.wait().await;
        }
        Err(e) => {
            warn!("{}; falling back to Ctrl-C only", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
