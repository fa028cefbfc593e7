//! In-process transport backed by tokio channels.
//!
//! The server side gets a [`MemoryTransport`]; the test (or any in-process
//! client) drives the other end through a [`MemoryPeer`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, FrameSource, Transport};
use crate::codec;
use crate::errors::TransportError;
use crate::messages::MessageBody;

/// Outbound buffer used by [`pair`].
pub const DEFAULT_CAPACITY: usize = 64;

/// Create a connected transport/peer pair.
pub fn pair() -> (MemoryTransport, MemoryPeer) {
    pair_with_capacity(DEFAULT_CAPACITY)
}

/// Create a pair whose server→peer direction buffers at most `capacity`
/// frames. Once full, writes block until the peer reads.
pub fn pair_with_capacity(capacity: usize) -> (MemoryTransport, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
    let closes = Arc::new(AtomicUsize::new(0));

    let transport = MemoryTransport {
        inbound: in_rx,
        outbound: out_tx,
        closes: Arc::clone(&closes),
    };
    let peer = MemoryPeer {
        inbound: Some(in_tx),
        outbound: out_rx,
        closes,
    };
    (transport, peer)
}

/// Server side of an in-process connection.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::Sender<String>,
    closes: Arc<AtomicUsize>,
}

impl Transport for MemoryTransport {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn split(self) -> (MemorySource, MemorySink) {
        (
            MemorySource {
                inbound: self.inbound,
            },
            MemorySink {
                outbound: Some(self.outbound),
                closes: self.closes,
            },
        )
    }
}

/// Reader half of a [`MemoryTransport`].
pub struct MemorySource {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

/// Writer half of a [`MemoryTransport`].
pub struct MemorySink {
    outbound: Option<mpsc::Sender<String>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let Some(tx) = &self.outbound else {
            return Err(TransportError::Closed);
        };
        tx.send(frame)
            .await
            .map_err(|_| TransportError::Write("peer stopped reading".into()))
    }

    async fn close(&mut self) {
        self.outbound = None;
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Peer side of an in-process connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    outbound: mpsc::Receiver<String>,
    closes: Arc<AtomicUsize>,
}

impl MemoryPeer {
    /// Send a raw frame to the server. Returns `false` after [`hang_up`](Self::hang_up)
    /// or once the server dropped its reader.
    pub fn send(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Encode and send a message body.
    pub fn send_body(&self, body: &MessageBody) -> bool {
        self.send(codec::encode(body))
    }

    /// Next frame written by the server, or `None` once the transport is
    /// closed and drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Drop the peer→server direction; the server's next read fails.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Refuse further frames; the server's next write fails.
    pub fn stop_reading(&mut self) {
        self.outbound.close();
    }

    /// How many times the server closed this transport.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Whether the server closed this transport.
    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}
