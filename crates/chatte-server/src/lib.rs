//! # chatte-server
//!
//! The routing engine and its WebSocket front end.
//!
//! - [`connection`]: per-peer actor (reader loop + command loop sharing one cancellation scope)
//! - [`registry`]: identity → connection map, written only by the hub side
//! - [`hub`]: inbound dispatch, fan-out and the inactivity sweep
//! - [`websocket`]: axum WebSocket transport and upgrade handler
//! - [`server`]: router, listener and startup wiring
//! - [`shutdown`]: process-wide root cancellation scope

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod health;
pub mod hub;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use connection::{Connection, ConnectionState};
pub use errors::{RegisterError, ServerError};
pub use hub::{Hub, HubConfig, Registrar};
pub use registry::Registry;
pub use server::{start, ServerHandle};
pub use shutdown::ShutdownCoordinator;
