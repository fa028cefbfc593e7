//! HTTP front end: router, listener and startup.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chatte_settings::{ChatSettings, ServerSettings};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::hub::{Hub, HubConfig, Registrar};
use crate::registry::Registry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ws_upgrade, OriginPolicy};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admits upgraded sockets into the hub.
    pub registrar: Registrar,
    /// Origin allow-list for `/websock`.
    pub origins: Arc<OriginPolicy>,
    /// Largest accepted inbound WebSocket message.
    pub max_message_size: usize,
    /// Root shutdown scope.
    pub shutdown: ShutdownCoordinator,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// Build handler state from listener settings.
    pub fn new(registrar: Registrar, settings: &ServerSettings, shutdown: ShutdownCoordinator) -> Self {
        Self {
            registrar,
            origins: Arc::new(OriginPolicy::new(settings.allowed_origins.clone())),
            max_message_size: settings.max_message_size,
            shutdown,
            start_time: Instant::now(),
        }
    }
}

/// Build the router: `/websock`, `/health`, and static files from
/// `static_dir` for everything else.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/websock", get(ws_upgrade))
        .route("/health", get(health_handler));
    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.with_state(state).layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registrar.connection_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    registry: Arc<Registry>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Registered connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Live registry view.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

/// Bind the listener, then spawn the hub and the HTTP server under
/// `shutdown`. Both stop when its root scope is cancelled.
pub async fn start(settings: &ChatSettings, shutdown: &ShutdownCoordinator) -> Result<ServerHandle, ServerError> {
    let bind_addr = settings.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    let addr = listener.local_addr()?;

    let (hub, registrar) = Hub::new(HubConfig::from_settings(settings), shutdown.token());
    let registry = Arc::clone(hub.registry());
    let _ = shutdown.spawn(hub.run());

    let state = AppState::new(registrar, &settings.server, shutdown.clone());
    let app = router(state, settings.server.static_dir.as_deref());
    let token = shutdown.token();
    let _ = shutdown.spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move { token.cancelled().await });
        if let Err(e) = serve.await {
            error!(error = %e, "http server failed");
        }
    });

    info!(
        %addr,
        static_dir = ?settings.server.static_dir,
        allowed_origins = ?settings.server.allowed_origins,
        "chatte listening"
    );
    Ok(ServerHandle { addr, registry })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_state(shutdown: &ShutdownCoordinator) -> AppState {
        let (_hub, registrar) = Hub::new(HubConfig::default(), shutdown.token());
        AppState::new(registrar, &ServerSettings::default(), shutdown.clone())
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let shutdown = ShutdownCoordinator::new();
        let app = router(make_state(&shutdown), None);

        let (status, body) = get_body(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let shutdown = ShutdownCoordinator::new();
        let app = router(make_state(&shutdown), None);
        shutdown.shutdown();

        let (_, body) = get_body(app, "/health").await;
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "shutting_down");
    }

    #[tokio::test]
    async fn unknown_route_returns_404_without_static_dir() {
        let shutdown = ShutdownCoordinator::new();
        let (status, _) = get_body(router(make_state(&shutdown), None), "/index.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>chatte</h1>").unwrap();
        let shutdown = ShutdownCoordinator::new();
        let app = router(make_state(&shutdown), Some(dir.path()));

        let (status, body) = get_body(app.clone(), "/index.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>chatte</h1>");

        let (status, _) = get_body(app, "/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plain_get_on_websock_is_rejected() {
        let shutdown = ShutdownCoordinator::new();
        let (status, _) = get_body(router(make_state(&shutdown), None), "/websock").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn start_binds_and_stops() {
        let mut settings = ChatSettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let shutdown = ShutdownCoordinator::new();

        let handle = start(&settings, &shutdown).await.unwrap();
        assert_ne!(handle.port(), 0);
        assert_eq!(handle.connection_count(), 0);
        assert!(shutdown.graceful_shutdown(std::time::Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut settings = ChatSettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = taken.local_addr().unwrap().port();

        let err = start(&settings, &ShutdownCoordinator::new()).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
