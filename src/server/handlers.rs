// HTTP request handlers

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::io::ErrorKind;
use std::sync::Arc;
use tower_http::services::ServeDir;

use super::middleware::require_ready;
use super::HostApplication;
use crate::service::BackgroundService;
use crate::supervisor::TaskState;

/// Served in place of the entry document when the frontend is missing
pub const MISSING_INDEX_HTML: &str = "<html><body><h1>Error: index.html not found</h1>\
<p>Ensure the frontend has been built and output to the static directory.</p></body></html>";

/// Create the main application router
pub fn create_router(server: Arc<HostApplication>) -> Router {
    let assets = ServeDir::new(server.web_dir().join("assets"));

    // Relay endpoints only answer while the background service is running
    let relay_router = Router::new()
        .route("/ws/:room", get(relay_socket))
        .route_layer(axum_middleware::from_fn_with_state(
            Arc::clone(&server),
            require_ready,
        ));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .merge(relay_router)
        .nest_service("/assets", assets)
        .with_state(server)
}

/// Handle GET / - serve the entry document
async fn index(State(server): State<Arc<HostApplication>>) -> Result<Response, AppError> {
    let index_path = server.web_dir().join("index.html");

    match tokio::fs::read(&index_path).await {
        Ok(contents) => Ok(Html(contents).into_response()),
        Err(e) if e.kind() == ErrorKind::NotFound || index_path.is_dir() => {
            tracing::warn!(path = %index_path.display(), "Entry document missing");
            Ok((StatusCode::NOT_FOUND, Html(MISSING_INDEX_HTML)).into_response())
        }
        Err(e) => Err(AppError(anyhow::Error::new(e).context(format!(
            "Failed to read {}",
            index_path.display()
        )))),
    }
}

/// Handle GET /ws/:room - bridge a websocket into a relay room
async fn relay_socket(
    State(server): State<Arc<HostApplication>>,
    Path(room): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let relay = Arc::clone(server.relay());
    ws.on_upgrade(move |socket| async move { relay.serve_connection(room, socket).await })
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub service_state: TaskState,
    pub rooms: usize,
    pub peers: usize,
    pub uptime_seconds: i64,
}

/// Handle GET /health - Health check endpoint
pub async fn health_check(State(server): State<Arc<HostApplication>>) -> Json<HealthStatus> {
    let relay = server.relay();
    let stats = relay.stats();

    Json(HealthStatus {
        status: if relay.is_running() { "ok" } else { "degraded" }.to_string(),
        service: relay.name().to_string(),
        service_state: server.supervisor().state(),
        rooms: stats.rooms,
        peers: stats.peers,
        uptime_seconds: Utc::now()
            .signed_duration_since(server.started_at())
            .num_seconds(),
    })
}

/// Error type for handlers
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Request failed");

        let body = serde_json::json!({
            "error": {
                "message": self.0.to_string(),
                "type": "server_error"
            }
        });

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
