//! `/websock` upgrade handler and origin policy.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::transport::WsTransport;
use crate::server::AppState;

/// Which `Origin` headers may open a WebSocket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Allow exactly `allowed`. An empty list allows any origin, including
    /// requests without an `Origin` header.
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Whether a request carrying `origin` is accepted.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        origin.is_some_and(|o| self.allowed.iter().any(|a| a == o))
    }
}

/// Upgrade to a WebSocket and register the connection with the hub.
///
/// Refuses with 403 when the origin is not allowed and 503 when the hub is
/// shutting down or full.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        warn!(origin = origin.unwrap_or("<none>"), "rejected websocket origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    if let Err(e) = state.registrar.check_admission() {
        warn!(error = %e, "refusing websocket upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
    }

    let registrar = state.registrar.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            match registrar.register(WsTransport::new(socket)) {
                Ok(identity) => debug!(identity = %identity, "websocket registered"),
                Err(e) => warn!(error = %e, "registration refused after upgrade"),
            }
        })
}
