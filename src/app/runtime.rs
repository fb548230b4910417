use super::orchestrator::run_role;
use super::{NodeOrchestrator, ShutdownReason};
use crate::error::{MeshError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{error, info, warn};

const NODE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

fn channel_closed() -> MeshError {
    MeshError::system("Shutdown channel closed unexpectedly")
}

impl NodeOrchestrator {
    /// Run the node until a signal, the quit key, a watchdog reset or a
    /// halting error; returns the process exit code
    pub async fn run(&mut self) -> Result<i32> {
        let ctx = self
            .context
            .take()
            .ok_or_else(|| MeshError::system("Node context not initialized"))?;

        let mut shutdown_receiver = self.take_shutdown_channel().await?;

        if self.keyboard_enabled {
            if let Some(handler) = &self.keyboard_handler {
                handler.start().await?;
            }
        }

        info!("Mesh node is running");
        let mut node = tokio::spawn(run_role(
            ctx,
            self.config.clone(),
            self.panel.clone(),
            self.cancellation_token.clone(),
        ));

        let reason = tokio::select! {
            received = &mut shutdown_receiver => received.map_err(|_| channel_closed())?,
            _ = self.cancellation_token.cancelled() => ShutdownReason::UserRequest,
            _ = self.watchdog_reset.cancelled() => ShutdownReason::WatchdogReset,
            finished = &mut node => match finished {
                Ok(Ok(())) => ShutdownReason::UserRequest,
                Ok(Err(e)) => ShutdownReason::Halted(e.to_string()),
                Err(e) => ShutdownReason::Halted(format!("node task failed: {}", e)),
            },
        };

        info!("Shutdown initiated: {}", reason);
        self.cancellation_token.cancel();

        if !node.is_finished() && timeout(NODE_STOP_TIMEOUT, node).await.is_err() {
            warn!("Node loop did not stop within {:?}", NODE_STOP_TIMEOUT);
        }

        // Stops the watchdog monitor as well
        self.watchdog_reset.cancel();
        self.stop_keyboard().await;

        let exit_code = reason.exit_code();
        info!("Mesh node stopped with exit code {}", exit_code);
        Ok(exit_code)
    }

    /// Stay out of the mesh after a fatal initialization error until a
    /// shutdown signal arrives
    pub async fn halt_safely(&mut self, cause: &MeshError) -> Result<i32> {
        error!("Node halted safely: {}", cause);
        info!("No mesh activity until shutdown");

        let shutdown_receiver = self.take_shutdown_channel().await?;
        let reason = tokio::select! {
            received = shutdown_receiver => received.map_err(|_| channel_closed())?,
            _ = self.cancellation_token.cancelled() => ShutdownReason::UserRequest,
        };

        info!("Leaving halted state: {}", reason);
        Ok(1)
    }

    async fn take_shutdown_channel(&mut self) -> Result<oneshot::Receiver<ShutdownReason>> {
        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| MeshError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| MeshError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;
        Ok(shutdown_receiver)
    }

    async fn stop_keyboard(&self) {
        if !self.keyboard_enabled {
            return;
        }
        if let Some(handler) = &self.keyboard_handler {
            if let Err(e) = handler.stop().await {
                error!("Error stopping keyboard: {}", e);
            }
        }
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (service manager stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
