//! Connection handler - registration and teardown of one signal unit
//!
//! Lifecycle of an accepted connection:
//!
//! ```text
//! Connecting --identifier--> Registered --> Idle (forwarding) --EOF/error--> Closed
//! ```
//!
//! The handler owns registration and teardown. Phase traffic belongs to the
//! Cycle, which talks to the unit through the [`TcpLink`] stored in the
//! registry. While idle the handler only forwards inbound messages to that link,
//! which is how it notices the peer going away.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::link::TcpLink;
use crate::protocol::{MAX_MESSAGE_SIZE, PLACEHOLDER_ID, decode_message};
use crate::registry::{ConnId, Registry, Unit};

/// Removes a unit from the registry when dropped
struct Registration {
    registry: Arc<Registry>,
    conn_id: ConnId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(self.conn_id);
    }
}

/// Per-connection handler, cloned into every connection task
#[derive(Clone)]
pub struct ConnectionHandler {
    registry: Arc<Registry>,
    accept_anonymous: bool,
    inbound_buffer: usize,
}

impl ConnectionHandler {
    pub fn new(registry: Arc<Registry>, accept_anonymous: bool, inbound_buffer: usize) -> Self {
        Self {
            registry,
            accept_anonymous,
            inbound_buffer: inbound_buffer.max(1),
        }
    }

    /// Drive one connection from accept to close
    ///
    /// Returns once the peer has gone and its registry entry has been removed.
    pub async fn run(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), LinkError> {
        let conn_id = ConnId::new();
        debug!(%conn_id, %peer, "ConnectionHandler::run: connecting");

        let (mut reader, writer) = stream.into_split();
        let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

        let n = reader.read(&mut buf).await?;
        let identifier = if n == 0 {
            if !self.accept_anonymous {
                warn!(%conn_id, %peer, "Peer closed before announcing itself, not registering");
                return Ok(());
            }
            PLACEHOLDER_ID.to_string()
        } else {
            let announced = decode_message(&buf[..n]);
            if announced.is_empty() {
                PLACEHOLDER_ID.to_string()
            } else {
                announced
            }
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(self.inbound_buffer);
        let unit = Unit::new(conn_id, identifier.clone(), Arc::new(TcpLink::new(writer, inbound_rx)));
        self.registry.register(unit);
        let registration = Registration {
            registry: Arc::clone(&self.registry),
            conn_id,
        };
        info!(%conn_id, unit = %identifier, %peer, "Signal unit registered");

        let result = if n == 0 {
            Ok(())
        } else {
            forward_inbound(&mut reader, &inbound_tx, &mut buf, &identifier).await
        };

        // Deregister before closing the channel, so a cycle that sees the link
        // close can rely on the unit already being gone from the registry
        drop(registration);
        drop(inbound_tx);

        match &result {
            Ok(()) => info!(%conn_id, unit = %identifier, "Signal unit disconnected"),
            Err(e) => warn!(%conn_id, unit = %identifier, error = %e, "Signal unit connection failed"),
        }
        result
    }
}

/// Forward every inbound message to the link until the peer closes
async fn forward_inbound(
    reader: &mut OwnedReadHalf,
    inbound_tx: &mpsc::Sender<String>,
    buf: &mut [u8],
    identifier: &str,
) -> Result<(), LinkError> {
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            return Ok(());
        }

        let message = decode_message(&buf[..n]);
        match inbound_tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(unit = %identifier, %message, "Inbound buffer full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(unit = %identifier, "forward_inbound: link dropped");
                return Ok(());
            }
        }
    }
}
