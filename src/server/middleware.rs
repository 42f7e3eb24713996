// Middleware for gating routes on background service readiness

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::HostApplication;

/// Reject relay traffic unless the relay is ready and not stopping
pub async fn require_ready(
    State(server): State<Arc<HostApplication>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if !server.relay().is_running() {
        tracing::warn!(
            path = %request.uri().path(),
            state = server.supervisor().state().as_label(),
            "Rejecting request, background service not running"
        );
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(next.run(request).await)
}
