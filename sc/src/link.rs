//! Unit links - the coordinator side of a unit's connection
//!
//! A link is the only way the Cycle talks to a unit. For TCP units the
//! connection is split on registration: the connection handler keeps the read
//! half and forwards each inbound message into a bounded channel, while the
//! link owns the write half and the receiving end of that channel. Phase
//! traffic therefore never races the handler's closure detection.
//!
//! The wire carries no sequence numbers, so a [`TcpLink`] counts the acks it
//! is owed. An ack that arrives after its receive timed out is still owed and
//! is skipped when it shows up, instead of answering a later command.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::error::LinkError;
use crate::protocol::Signal;

/// Phase I/O against one signal unit
#[async_trait]
pub trait UnitLink: Send + Sync {
    /// Send one phase command
    async fn send(&self, signal: Signal) -> Result<(), LinkError>;

    /// Wait for the next message from the unit
    ///
    /// Returns [`LinkError::PeerClosed`] once the connection is gone and every
    /// buffered message has been consumed.
    async fn recv(&self) -> Result<String, LinkError>;

    /// Drop messages that arrived while nobody was waiting for them
    ///
    /// Returns how many were dropped.
    fn discard_pending(&self) -> usize;
}

/// Link over a split TCP connection
pub struct TcpLink {
    writer: Mutex<OwnedWriteHalf>,
    inbound: Mutex<mpsc::Receiver<String>>,
    /// Commands sent whose acknowledgment has not been consumed yet
    owed: AtomicUsize,
}

impl TcpLink {
    /// Create a link from the write half and the handler's inbound channel
    pub fn new(writer: OwnedWriteHalf, inbound: mpsc::Receiver<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            inbound: Mutex::new(inbound),
            owed: AtomicUsize::new(0),
        }
    }

    /// Count one consumed inbound message against the owed acks
    ///
    /// Returns how many were owed before it.
    fn settle_one(&self) -> usize {
        self.owed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |owed| Some(owed.saturating_sub(1)))
            .unwrap_or_else(|owed| owed)
    }

    #[cfg(test)]
    pub(crate) fn owed(&self) -> usize {
        self.owed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitLink for TcpLink {
    async fn send(&self, signal: Signal) -> Result<(), LinkError> {
        debug!(%signal, "TcpLink::send: called");
        let mut writer = self.writer.lock().await;
        writer.write_all(signal.as_str().as_bytes()).await?;
        writer.flush().await?;
        self.owed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&self) -> Result<String, LinkError> {
        let mut inbound = self.inbound.lock().await;
        loop {
            let message = inbound.recv().await.ok_or(LinkError::PeerClosed)?;
            let owed = self.settle_one();
            if owed > 1 {
                debug!(%message, owed, "TcpLink::recv: skipping late ack for an earlier command");
                continue;
            }
            debug!(%message, "TcpLink::recv: received");
            return Ok(message);
        }
    }

    fn discard_pending(&self) -> usize {
        // A held lock means a receive is in flight, so nothing is stale
        let Ok(mut inbound) = self.inbound.try_lock() else {
            return 0;
        };
        let mut dropped = 0;
        while inbound.try_recv().is_ok() {
            self.settle_one();
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted links that record every send and ack into a shared journal

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::UnitLink;
    use crate::error::LinkError;
    use crate::protocol::{Signal, ack_for};
    use crate::registry::{ConnId, Unit};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Event {
        Sent(&'static str, Signal),
        Acked(&'static str),
    }

    pub(crate) type Journal = Arc<Mutex<Vec<Event>>>;

    pub(crate) fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub(crate) struct ScriptedLink {
        name: &'static str,
        journal: Journal,
        last_sent: Mutex<Option<Signal>>,
        recv_count: AtomicUsize,
        fail_recv_at: Option<usize>,
        silent: bool,
        delay: Duration,
        stale: Mutex<VecDeque<String>>,
    }

    impl ScriptedLink {
        pub(crate) fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: Arc::clone(journal),
                last_sent: Mutex::new(None),
                recv_count: AtomicUsize::new(0),
                fail_recv_at: None,
                silent: false,
                delay: Duration::ZERO,
                stale: Mutex::new(VecDeque::new()),
            }
        }

        /// The receive with this zero-based index reports a closed peer
        pub(crate) fn failing_recv_at(mut self, index: usize) -> Self {
            self.fail_recv_at = Some(index);
            self
        }

        /// Receives never complete
        pub(crate) fn silent(mut self) -> Self {
            self.silent = true;
            self
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Queue messages that arrived before any command was sent
        ///
        /// Unless discarded, they are returned by `recv` ahead of real acks.
        pub(crate) fn with_stale(self, messages: &[&str]) -> Self {
            self.stale
                .lock()
                .unwrap()
                .extend(messages.iter().map(|m| m.to_string()));
            self
        }

        pub(crate) fn into_unit(self) -> Unit {
            Unit::new(ConnId::new(), self.name, Arc::new(self))
        }
    }

    #[async_trait]
    impl UnitLink for ScriptedLink {
        async fn send(&self, signal: Signal) -> Result<(), LinkError> {
            self.journal.lock().unwrap().push(Event::Sent(self.name, signal));
            *self.last_sent.lock().unwrap() = Some(signal);
            Ok(())
        }

        async fn recv(&self) -> Result<String, LinkError> {
            let index = self.recv_count.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.silent {
                std::future::pending::<()>().await;
            }
            if self.fail_recv_at == Some(index) {
                return Err(LinkError::PeerClosed);
            }
            if let Some(stale) = self.stale.lock().unwrap().pop_front() {
                return Ok(stale);
            }
            let last = *self.last_sent.lock().unwrap();
            self.journal.lock().unwrap().push(Event::Acked(self.name));
            Ok(ack_for(last.map(|s| s.as_str()).unwrap_or_default()))
        }

        fn discard_pending(&self) -> usize {
            let mut stale = self.stale.lock().unwrap();
            let dropped = stale.len();
            stale.clear();
            dropped
        }
    }
}
