//! Signal unit client
//!
//! Connects to the coordinator, announces its identifier once, then answers
//! every command with `OK-<command>` until the coordinator hangs up.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::UnitConfig;
use crate::error::UnitError;
use crate::protocol::{MAX_MESSAGE_SIZE, Signal, ack_for, decode_message};

/// What a unit did before its connection closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSummary {
    /// Commands received and acknowledged
    pub commands_handled: u64,
    /// Last recognised signal the unit was told to show
    pub last_signal: Option<Signal>,
}

/// A signal unit that connects to a coordinator
#[derive(Debug, Clone)]
pub struct SignalUnit {
    identifier: String,
    server: String,
    connect_timeout: Duration,
}

impl SignalUnit {
    pub fn new(identifier: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            server: server.into(),
            connect_timeout: UnitConfig::default().connect_timeout(),
        }
    }

    pub fn from_config(identifier: impl Into<String>, config: &UnitConfig) -> Self {
        Self::new(identifier, config.server.clone()).with_connect_timeout(config.connect_timeout())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Connect and serve commands until the coordinator closes the connection
    pub async fn run(&self) -> Result<UnitSummary, UnitError> {
        let stream = self.connect().await?;
        info!(unit = %self.identifier, server = %self.server, "Connected to coordinator");
        let summary = self.serve(stream).await?;
        info!(unit = %self.identifier, commands = summary.commands_handled, "Finished");
        Ok(summary)
    }

    async fn connect(&self) -> Result<TcpStream, UnitError> {
        debug!(unit = %self.identifier, server = %self.server, "SignalUnit::connect: called");
        let connected = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.server))
            .await
            .map_err(|_| UnitError::ConnectTimeout {
                addr: self.server.clone(),
                timeout_ms: self.connect_timeout.as_millis() as u64,
            })?;

        match connected {
            Ok(stream) => Ok(stream),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => Err(UnitError::ConnectionRefused {
                addr: self.server.clone(),
                source: e,
            }),
            Err(e) => Err(UnitError::Transport(e)),
        }
    }

    /// Announce and acknowledge commands on an established connection
    pub async fn serve(&self, mut stream: TcpStream) -> Result<UnitSummary, UnitError> {
        stream.write_all(self.identifier.as_bytes()).await?;
        stream.flush().await?;

        let mut summary = UnitSummary::default();
        let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                debug!(unit = %self.identifier, "SignalUnit::serve: coordinator closed the connection");
                break;
            }

            let command = decode_message(&buf[..n]);
            info!(unit = %self.identifier, %command, "Command received");
            match command.parse::<Signal>() {
                Ok(signal) => summary.last_signal = Some(signal),
                Err(e) => warn!(unit = %self.identifier, error = %e, "Acknowledging unrecognised command"),
            }

            stream.write_all(ack_for(&command).as_bytes()).await?;
            stream.flush().await?;
            summary.commands_handled += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpSocket};

    async fn read_text(stream: &mut TcpStream) -> String {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    #[test]
    fn test_from_config() {
        let config = UnitConfig {
            server: "127.0.0.1:7000".to_string(),
            connect_timeout_ms: 250,
        };
        let unit = SignalUnit::from_config("north", &config);
        assert_eq!(unit.identifier(), "north");
        assert_eq!(unit.server, "127.0.0.1:7000");
        assert_eq!(unit.connect_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_acknowledges_until_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let coordinator = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            assert_eq!(read_text(&mut stream).await, "north");

            stream.write_all(b"GREEN").await.unwrap();
            assert_eq!(read_text(&mut stream).await, "OK-GREEN");

            stream.write_all(b"FLASH").await.unwrap();
            assert_eq!(read_text(&mut stream).await, "OK-FLASH");

            stream.write_all(b"RED").await.unwrap();
            assert_eq!(read_text(&mut stream).await, "OK-RED");
        });

        let summary = SignalUnit::new("north", addr.to_string()).run().await.unwrap();
        coordinator.await.unwrap();

        assert_eq!(summary.commands_handled, 3);
        assert_eq!(summary.last_signal, Some(Signal::Red));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = SignalUnit::new("north", addr.to_string()).run().await.unwrap_err();
        assert!(matches!(err, UnitError::ConnectionRefused { .. }));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_connect_timeout() {
        // A listener that never accepts stops answering SYNs once its backlog is full
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut held = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
                Ok(stream) => held.push(stream.unwrap()),
                Err(_) => break,
            }
        }

        let err = SignalUnit::new("north", addr.to_string())
            .with_connect_timeout(Duration::from_millis(50))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, UnitError::ConnectTimeout { timeout_ms: 50, .. }));
        drop(listener);
    }
}
