//! Inbound messages (peer → hub).

use chrono::{DateTime, Utc};

use crate::ids::Identity;

/// Payload of an inbound frame, keyed by its `Discriminator`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    /// Text for every connected peer.
    Public {
        /// Message text.
        text: String,
    },
    /// Text for a single named peer.
    Private {
        /// Display name of the intended recipient.
        recipient: Identity,
        /// Message text.
        text: String,
    },
    /// Keep-alive; only refreshes the sender's activity timestamp.
    Ping,
    /// The sender wants to disconnect.
    Quit,
}

impl MessageBody {
    /// Wire discriminant for this variant.
    pub fn discriminant(&self) -> &'static str {
        match self {
            Self::Public { .. } => "PUBLIC",
            Self::Private { .. } => "PRIVATE",
            Self::Ping => "PING",
            Self::Quit => "QUIT",
        }
    }
}

/// A decoded inbound message, stamped by the receiving connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Identity of the connection the frame arrived on.
    pub sender: Identity,
    /// When the frame was decoded.
    pub received_at: DateTime<Utc>,
    /// What the peer asked for.
    pub body: MessageBody,
}

impl Message {
    /// Stamp a decoded body with its sender and the current time.
    pub fn stamp(sender: Identity, body: MessageBody) -> Self {
        Self::stamp_at(sender, body, Utc::now())
    }

    /// Stamp with an explicit receipt time.
    pub fn stamp_at(sender: Identity, body: MessageBody, received_at: DateTime<Utc>) -> Self {
        Self {
            sender,
            received_at,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_match_wire_names() {
        assert_eq!(MessageBody::Public { text: "x".into() }.discriminant(), "PUBLIC");
        assert_eq!(
            MessageBody::Private {
                recipient: Identity::from_raw("b"),
                text: "x".into()
            }
            .discriminant(),
            "PRIVATE"
        );
        assert_eq!(MessageBody::Ping.discriminant(), "PING");
        assert_eq!(MessageBody::Quit.discriminant(), "QUIT");
    }

    #[test]
    fn stamp_records_sender_and_time() {
        let before = Utc::now();
        let msg = Message::stamp(Identity::numbered(1), MessageBody::Ping);
        assert_eq!(msg.sender.as_str(), "User1");
        assert!(msg.received_at >= before);
        assert_eq!(msg.body, MessageBody::Ping);
    }
}
