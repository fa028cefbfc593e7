//! WebSocket front end: the axum-backed [`Transport`](chatte_core::transport::Transport)
//! and the `/websock` upgrade handler.

pub mod handler;
pub mod transport;

pub use handler::{ws_upgrade, OriginPolicy};
pub use transport::WsTransport;
