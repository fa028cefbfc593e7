//! Byte-frame transport to a remote peer.
//!
//! A connection splits its transport once: the reader loop owns the
//! [`FrameSource`], the command loop owns the [`FrameSink`]. Only the command
//! loop ever calls [`FrameSink::close`].

pub mod memory;

use async_trait::async_trait;

use crate::errors::TransportError;

/// Inbound half of a transport.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame from the peer.
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one text frame to the peer.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the transport. Called exactly once per connection.
    async fn close(&mut self);
}

/// A bidirectional frame channel produced by an acceptor.
pub trait Transport: Send + 'static {
    /// Reader half.
    type Source: FrameSource;
    /// Writer half.
    type Sink: FrameSink;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Source, Self::Sink);
}
