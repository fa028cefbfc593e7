//! Outbound commands (hub → one connection).

use chrono::{DateTime, Utc};

use crate::ids::Identity;

/// Instruction delivered through a connection's mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Public text relayed to every peer.
    Broadcast {
        /// Author of the relayed text.
        sender: Identity,
        /// Message text.
        text: String,
        /// When the hub's connection received it.
        time: DateTime<Utc>,
    },
    /// Private text relayed to this peer only.
    PrivateDeliver {
        /// Author of the relayed text.
        sender: Identity,
        /// Message text.
        text: String,
        /// When the hub's connection received it.
        time: DateTime<Utc>,
    },
    /// Error notice for this peer.
    Error {
        /// Human-readable reason.
        text: String,
    },
    /// Shut the connection down.
    Stop,
}

impl Command {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Broadcast { .. } => "broadcast",
            Self::PrivateDeliver { .. } => "private",
            Self::Error { .. } => "error",
            Self::Stop => "stop",
        }
    }

    /// Text frame written to the peer, if this command produces one.
    pub fn to_frame(&self) -> Option<String> {
        match self {
            Self::Broadcast { sender, text, .. } | Self::PrivateDeliver { sender, text, .. } => {
                Some(format!("{sender}: {text}"))
            }
            Self::Error { text } => Some(format!("error: {text}")),
            Self::Stop => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_frame() {
        let cmd = Command::Broadcast {
            sender: Identity::numbered(1),
            text: "hi".into(),
            time: Utc::now(),
        };
        assert_eq!(cmd.to_frame().as_deref(), Some("User1: hi"));
    }

    #[test]
    fn private_frame_matches_broadcast_format() {
        let cmd = Command::PrivateDeliver {
            sender: Identity::numbered(1),
            text: "secret".into(),
            time: Utc::now(),
        };
        assert_eq!(cmd.to_frame().as_deref(), Some("User1: secret"));
    }

    #[test]
    fn error_frame() {
        let cmd = Command::Error {
            text: "Recipient ghost not found".into(),
        };
        assert_eq!(
            cmd.to_frame().as_deref(),
            Some("error: Recipient ghost not found")
        );
    }

    #[test]
    fn stop_has_no_frame() {
        assert!(Command::Stop.to_frame().is_none());
        assert_eq!(Command::Stop.kind(), "stop");
    }
}
