//! # chatte-core
//!
//! Shared types for the chatte routing engine.
//!
//! - [`Identity`]: display names handed out to connected peers
//! - [`Message`] / [`MessageBody`]: inbound traffic, stamped with sender and receipt time
//! - [`Command`]: outbound instructions from the hub to one connection
//! - [`codec`]: JSON frame decoding and outbound frame rendering
//! - [`transport`]: the byte-frame abstraction a connection runs over

#![deny(unsafe_code)]

pub mod codec;
pub mod commands;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod transport;

pub use codec::decode;
pub use commands::Command;
pub use errors::{DecodeError, TransportError};
pub use ids::Identity;
pub use messages::{Message, MessageBody};
