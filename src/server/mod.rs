// Syncdock - Host Application Module
// HTTP host that serves the bundled frontend and bridges websocket peers
// into the supervised document relay

mod assets;
mod handlers;
mod middleware;

pub use assets::resolve_web_dir;
pub use handlers::{create_router, health_check, HealthStatus, MISSING_INDEX_HTML};
pub use middleware::require_ready;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::errors::bind_failed_error;
use crate::service::DocumentRelay;
use crate::supervisor::{lifespan, ServiceSupervisor};

/// Main host structure
pub struct HostApplication {
    /// Effective configuration
    config: Config,
    /// Directory holding index.html and assets/
    web_dir: PathBuf,
    /// Background relay (shared with websocket handlers)
    relay: Arc<DocumentRelay>,
    /// Supervisor owning the relay task
    supervisor: Arc<ServiceSupervisor<DocumentRelay>>,
    started_at: DateTime<Utc>,
}

impl HostApplication {
    /// Create the host. Nothing runs until `serve()`.
    pub fn new(config: Config) -> Result<Self> {
        let web_dir = resolve_web_dir(config.assets.static_dir.as_deref());
        let relay = Arc::new(DocumentRelay::new(config.relay.clone()));
        let supervisor = Arc::new(ServiceSupervisor::new(
            Arc::clone(&relay),
            config.supervisor.shutdown_grace()?,
        ));

        Ok(Self {
            config,
            web_dir,
            relay,
            supervisor,
            started_at: Utc::now(),
        })
    }

    /// Start the relay, bind the configured address, and serve until
    /// `shutdown` is cancelled. The relay is stopped on every exit path.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let server = Arc::new(self);
        let supervisor = Arc::clone(&server.supervisor);

        lifespan(&*supervisor, async {
            let addr = server.config.server.bind_address.clone();
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| anyhow::anyhow!(bind_failed_error(&addr, e)))?;
            run_http(Arc::clone(&server), listener, shutdown).await
        })
        .await
    }

    /// Like `serve()`, on an already bound listener. Connections may queue
    /// on the socket, but no request is handled before the relay is ready.
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let server = Arc::new(self);
        let supervisor = Arc::clone(&server.supervisor);

        lifespan(&*supervisor, run_http(Arc::clone(&server), listener, shutdown)).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn web_dir(&self) -> &Path {
        &self.web_dir
    }

    pub fn relay(&self) -> &Arc<DocumentRelay> {
        &self.relay
    }

    pub fn supervisor(&self) -> &Arc<ServiceSupervisor<DocumentRelay>> {
        &self.supervisor
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

async fn run_http(
    server: Arc<HostApplication>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;

    let app = create_router(server).layer(TraceLayer::new_for_http());

    tracing::info!("Serving on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server failed")?;
    tracing::info!("HTTP server stopped accepting connections");

    Ok(())
}
