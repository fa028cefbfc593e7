//! Server-side error types.

/// Why a new connection was not admitted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// The root scope is cancelled; no new connections are started.
    #[error("server is shutting down")]
    ShuttingDown,
    /// The registry already holds `limit` connections.
    #[error("connection limit of {limit} reached")]
    AtCapacity {
        /// Configured maximum.
        limit: usize,
    },
}

/// Failure while starting the HTTP front end.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other listener I/O failure.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_error_display() {
        assert_eq!(
            RegisterError::AtCapacity { limit: 3 }.to_string(),
            "connection limit of 3 reached"
        );
        assert_eq!(RegisterError::ShuttingDown.to_string(), "server is shutting down");
    }

    #[test]
    fn bind_error_keeps_source() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
