//! [`Transport`] over an upgraded axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use chatte_core::transport::{FrameSink, FrameSource, Transport};
use chatte_core::TransportError;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

/// An upgraded WebSocket, not yet split.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for WsTransport {
    type Source = WsSource;
    type Sink = WsSink;

    fn split(self) -> (WsSource, WsSink) {
        let (sink, stream) = self.socket.split();
        (WsSource { stream }, WsSink { sink })
    }
}

/// Read half. Text and binary frames are passed through as bytes;
/// control frames are skipped (axum answers pings itself).
pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer sent close");
                    return Err(TransportError::Closed);
                }
                None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
            }
        }
    }
}

/// Write half. Frames go out as text messages.
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!(error = %e, "close frame not sent");
        }
        let _ = self.sink.close().await;
    }
}
