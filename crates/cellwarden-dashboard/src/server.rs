//! [`DashboardServer`] – HTTP + WebSocket server for the status UI.
//!
//! * Plain HTTP request for `/api/state` → current snapshot as JSON.
//! * Any other plain HTTP request → 200 OK with the embedded status page.
//! * WebSocket upgrade → snapshot JSON pushed on connect and then on every
//!   refresh tick.
//!
//! Strictly read-only: whatever a client sends upstream is dropped.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, warn};

use cellwarden_state::StateStore;
use cellwarden_types::WardenError;

/// Default TCP port for the dashboard.
pub const DEFAULT_PORT: u16 = 8080;

/// How often connected WebSocket clients receive a fresh snapshot.
const DEFAULT_REFRESH: Duration = Duration::from_secs(2);

/// The compiled-in status page (HTML + CSS + JS).
const DASHBOARD_HTML: &str = include_str!("dashboard.html");

// ---------------------------------------------------------------------------
// DashboardServer
// ---------------------------------------------------------------------------

/// Serves the status UI and streams the latest published snapshot.
///
/// # Example
///
/// ```rust,no_run
/// use cellwarden_dashboard::DashboardServer;
/// use cellwarden_state::StateStore;
/// use cellwarden_types::DisplaySettings;
///
/// #[tokio::main]
/// async fn main() {
///     let store = StateStore::new(DisplaySettings::default());
///     DashboardServer::new(store)
///         .run()
///         .await
///         .expect("dashboard server failed");
/// }
/// ```
pub struct DashboardServer {
    store: StateStore,
    port: u16,
    refresh: Duration,
}

impl DashboardServer {
    /// Create a server reading from `store` on the [`DEFAULT_PORT`].
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            port: DEFAULT_PORT,
            refresh: DEFAULT_REFRESH,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start serving. Runs until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Channel`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), WardenError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WardenError::Channel(format!("dashboard bind error on {addr}: {e}")))?;

        tracing::info!(port = self.port, "dashboard listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let store = self.store.clone();
                    let refresh = self.refresh;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, store, refresh).await {
                            debug!(%peer, error = %e, "dashboard client error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "dashboard accept error");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: StateStore,
    refresh: Duration,
) -> Result<(), WardenError> {
    // Peek at the request head to decide between a WebSocket upgrade and a
    // plain HTTP response; peeking leaves the bytes for the WS handshaker.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| WardenError::Channel(format!("peek error from {peer}: {e}")))?;
    let head = String::from_utf8_lossy(&buf[..n]);

    if is_ws_upgrade(&head) {
        stream_snapshots(stream, peer, store, refresh).await
    } else if request_path(&head) == Some("/api/state") {
        serve_json(stream, &store).await
    } else {
        serve_html(stream).await
    }
}

/// `true` when the request head asks for a WebSocket upgrade.
fn is_ws_upgrade(head: &str) -> bool {
    head.lines().any(|line| {
        let lower = line.to_lowercase();
        lower.starts_with("upgrade:") && lower.contains("websocket")
    })
}

/// Extract the request path from an HTTP request head.
fn request_path(head: &str) -> Option<&str> {
    head.lines().next()?.split_whitespace().nth(1)
}

// ---------------------------------------------------------------------------
// Plain HTTP
// ---------------------------------------------------------------------------

async fn serve_html(stream: TcpStream) -> Result<(), WardenError> {
    write_response(stream, "text/html; charset=utf-8", DASHBOARD_HTML).await
}

async fn serve_json(stream: TcpStream, store: &StateStore) -> Result<(), WardenError> {
    let body = serde_json::to_string(&store.read())
        .map_err(|e| WardenError::Channel(format!("snapshot serialization error: {e}")))?;
    write_response(stream, "application/json", &body).await
}

async fn write_response(
    mut stream: TcpStream,
    content_type: &str,
    body: &str,
) -> Result<(), WardenError> {
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| WardenError::Channel(format!("HTTP write error: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// WebSocket: snapshot stream
// ---------------------------------------------------------------------------

async fn stream_snapshots(
    stream: TcpStream,
    peer: SocketAddr,
    store: StateStore,
    refresh: Duration,
) -> Result<(), WardenError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| WardenError::Channel(format!("WS handshake from {peer}: {e}")))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut ticker = tokio::time::interval(refresh);

    loop {
        tokio::select! {
            // ── Downstream: snapshot → browser ─────────────────────────────
            _ = ticker.tick() => {
                match serde_json::to_string(&store.read()) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "snapshot serialization error");
                    }
                }
            }
            // ── Upstream: read-only, drop everything except Close ──────────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
