//! Error types shared across the workspace.

/// Why an inbound frame could not be turned into a [`MessageBody`](crate::MessageBody).
///
/// Both variants are recoverable: the connection logs and keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// `Discriminator` was absent or not one of the known tags.
    #[error("unknown discriminator: {}", .0.as_deref().unwrap_or("<missing>"))]
    UnknownDiscriminant(Option<String>),
    /// The frame was not valid JSON, or a required field had the wrong shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure on a connection's byte-frame transport.
///
/// Fatal for that connection only.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer went away or the transport was already closed.
    #[error("transport closed")]
    Closed,
    /// Reading the next frame failed.
    #[error("read failed: {0}")]
    Read(String),
    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(String),
}
