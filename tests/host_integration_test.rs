// Integration tests for the HTTP host
//
// These tests run a real listener and verify:
// - Health and entry document routes
// - Websocket peers relayed through the supervised service
// - Relay shutdown when the host stops

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use syncdock::config::Config;
use syncdock::server::HostApplication;
use syncdock::service::{BackgroundService, DocumentRelay};
use syncdock::supervisor::{ServiceSupervisor, TaskState};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

struct RunningHost {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
    relay: Arc<DocumentRelay>,
    supervisor: Arc<ServiceSupervisor<DocumentRelay>>,
}

/// Helper to start a host on an ephemeral port and wait for the relay
async fn start_host(web_dir: &Path) -> Result<RunningHost> {
    let mut config = Config::default();
    config.assets.static_dir = Some(web_dir.to_path_buf());
    config.supervisor.shutdown_grace_secs = 1.0;

    let host = HostApplication::new(config)?;
    let relay = Arc::clone(host.relay());
    let supervisor = Arc::clone(host.supervisor());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(host.serve_on(listener, shutdown.clone()));

    timeout(Duration::from_secs(5), relay.readiness().wait()).await?;

    Ok(RunningHost {
        addr,
        shutdown,
        task,
        relay,
        supervisor,
    })
}

/// Helper to wait until the relay sees `peers` connected peers
async fn wait_for_peers(relay: &DocumentRelay, peers: usize) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        while relay.stats().peers < peers {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_health_and_missing_index() -> Result<()> {
    let web_dir = TempDir::new()?;
    let host = start_host(web_dir.path()).await?;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("http://{}/health", host.addr))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service_state"], "running");

    let index = client.get(format!("http://{}/", host.addr)).send().await?;
    assert_eq!(index.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(index.text().await?.contains("index.html not found"));

    host.shutdown.cancel();
    host.task.await??;
    assert!(host.relay.is_stopped());
    assert_eq!(host.supervisor.state(), TaskState::CompletedGracefully);

    Ok(())
}

#[tokio::test]
async fn test_websocket_peers_share_room() -> Result<()> {
    let web_dir = TempDir::new()?;
    let host = start_host(web_dir.path()).await?;
    let url = format!("ws://{}/ws/notes", host.addr);

    let (mut alice, _) = connect_async(url.as_str()).await?;
    let (mut bob, _) = connect_async(url.as_str()).await?;
    wait_for_peers(&host.relay, 2).await?;

    alice.send(Message::binary(vec![1u8, 2, 3])).await?;

    let received = timeout(Duration::from_secs(5), bob.next())
        .await?
        .expect("bob's stream ended")?;
    assert!(received.is_binary());
    assert_eq!(received.into_data().to_vec(), vec![1u8, 2, 3]);

    host.shutdown.cancel();
    host.task.await??;
    assert!(host.relay.is_stopped());

    // The relay closes remaining peers once it stops
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match bob.next().await {
                None | Some(Err(_)) => break,
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "peer should be disconnected after shutdown");

    Ok(())
}

#[tokio::test]
async fn test_static_assets_served() -> Result<()> {
    let web_dir = TempDir::new()?;
    std::fs::write(web_dir.path().join("index.html"), "<div id=app></div>")?;
    std::fs::create_dir_all(web_dir.path().join("assets"))?;
    std::fs::write(web_dir.path().join("assets/style.css"), "body {}")?;

    let host = start_host(web_dir.path()).await?;
    let client = reqwest::Client::new();

    let index = client.get(format!("http://{}/", host.addr)).send().await?;
    assert!(index.status().is_success());
    assert_eq!(index.text().await?, "<div id=app></div>");

    let css = client
        .get(format!("http://{}/assets/style.css", host.addr))
        .send()
        .await?;
    assert!(css.status().is_success());
    assert_eq!(css.text().await?, "body {}");

    host.shutdown.cancel();
    host.task.await??;

    Ok(())
}

#[tokio::test]
async fn test_bind_failure_still_stops_relay() -> Result<()> {
    let web_dir = TempDir::new()?;
    let occupied = std::net::TcpListener::bind("127.0.0.1:0")?;

    let mut config = Config::default();
    config.assets.static_dir = Some(web_dir.path().to_path_buf());
    config.server.bind_address = occupied.local_addr()?.to_string();
    config.supervisor.shutdown_grace_secs = 1.0;

    let host = HostApplication::new(config)?;
    let relay = Arc::clone(host.relay());
    let supervisor = Arc::clone(host.supervisor());

    let err = timeout(Duration::from_secs(10), host.serve(CancellationToken::new()))
        .await?
        .unwrap_err();

    assert!(err.to_string().contains("Could not bind"), "{}", err);
    assert!(relay.is_stopped());
    assert_eq!(supervisor.state(), TaskState::CompletedGracefully);

    drop(occupied);
    Ok(())
}
