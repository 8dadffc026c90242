//! Transport listener - accepts signal units and runs the coordinator

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::connection::ConnectionHandler;
use crate::coordinator::Coordinator;
use crate::registry::Registry;

/// How long shutdown waits for the coordinator loop to notice
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Pause after a failed accept so persistent errors (EMFILE) do not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound coordinator server
pub struct Server {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    handler: ConnectionHandler,
}

impl Server {
    /// Bind the listener described by `config`
    pub async fn bind(config: &CoordinatorConfig) -> Result<Self> {
        debug!(bind = %config.bind, "Server::bind: called");
        let listener = TcpListener::bind(&config.bind)
            .await
            .context(format!("Failed to bind coordinator socket on {}", config.bind))?;

        let registry = Arc::new(Registry::new());
        let coordinator = Arc::new(Coordinator::new(Arc::clone(&registry), config));
        let handler = ConnectionHandler::new(registry, config.accept_anonymous, config.inbound_buffer);

        Ok(Self {
            listener,
            coordinator,
            handler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read listener address")
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.coordinator.registry())
    }

    /// Accept connections and run the coordinator loop until shutdown
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Coordinator listening");

        let (coord_shutdown_tx, coord_shutdown_rx) = mpsc::channel(1);
        let coordinator = Arc::clone(&self.coordinator);
        let mut coord_task = tokio::spawn(async move { coordinator.run(coord_shutdown_rx).await });

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "Server::run: connection accepted");
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(%peer, error = %e, "Server::run: failed to set TCP_NODELAY");
                            }
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handler.run(stream, peer).await {
                                    debug!(%peer, error = %e, "Connection handler ended with error");
                                }
                            });
                        }
                        Err(e) => back_off_after_accept_error(&e).await,
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Server::run: shutdown signal received");
                    break;
                }
            }
        }

        // An in-flight cycle is not waited for beyond the grace period
        let _ = coord_shutdown_tx.send(()).await;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut coord_task).await.is_err() {
            warn!("Coordinator still mid-cycle at shutdown, aborting it");
            coord_task.abort();
        }

        info!("Coordinator server stopped");
        Ok(())
    }
}

async fn back_off_after_accept_error(e: &std::io::Error) {
    warn!(error = %e, backoff = ?ACCEPT_BACKOFF, "Accept error");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}
