//! Debug HTTP listener
//!
//! Runs on its own detached thread with a single-threaded tokio runtime. The
//! session that spawns it never joins or cancels it; once listening it stays up
//! for the rest of the process. The bind outcome is handed back over a channel
//! that callers may poll, but nothing in the session waits on it.

use super::vars::registry;
use crate::profiling::HeapSnapshot;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::net::TcpListener;

/// Outcome of the listener's bind attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStatus {
    Listening(SocketAddr),
    Failed(String),
}

/// Handle to a detached debug listener
pub struct DebugEndpoint {
    bind: String,
    status_rx: Receiver<EndpointStatus>,
    status: OnceLock<EndpointStatus>,
}

impl DebugEndpoint {
    /// Start listening on `bind` in the background
    ///
    /// Returns immediately; failures only show up through [`Self::status`].
    pub fn spawn(bind: &str) -> Self {
        let addr = normalize_bind(bind);
        let (status_tx, status_rx) = bounded(1);

        let listen_addr = addr.clone();
        let spawned = std::thread::Builder::new()
            .name("debug-endpoint".to_string())
            .spawn(move || serve(&listen_addr, &status_tx));
        if let Err(e) = spawned {
            warn!("debug endpoint thread failed to start: {e}");
        }

        Self { bind: addr, status_rx, status: OnceLock::new() }
    }

    /// The address the listener was asked to bind
    pub fn bind(&self) -> &str {
        &self.bind
    }

    /// Non-blocking check of the bind outcome; `None` while still starting
    pub fn status(&self) -> Option<&EndpointStatus> {
        if let Some(status) = self.status.get() {
            return Some(status);
        }
        match self.status_rx.try_recv() {
            Ok(status) => Some(self.status.get_or_init(|| status)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.status.get_or_init(exited)),
        }
    }

    /// Wait up to `timeout` for the bind outcome
    pub fn wait_ready(&self, timeout: Duration) -> Option<&EndpointStatus> {
        if let Some(status) = self.status.get() {
            return Some(status);
        }
        match self.status_rx.recv_timeout(timeout) {
            Ok(status) => Some(self.status.get_or_init(|| status)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.status.get_or_init(exited)),
        }
    }

    /// Bound address once the listener is up
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.status() {
            Some(EndpointStatus::Listening(addr)) => Some(*addr),
            _ => None,
        }
    }
}

fn exited() -> EndpointStatus {
    EndpointStatus::Failed("listener thread exited before binding".to_string())
}

/// `:6060` listens on every interface, like a bare port in most tools
fn normalize_bind(bind: &str) -> String {
    let bind = bind.trim();
    if bind.starts_with(':') {
        format!("0.0.0.0{bind}")
    } else {
        bind.to_string()
    }
}

fn serve(addr: &str, status_tx: &Sender<EndpointStatus>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            debug!("debug endpoint runtime failed: {e}");
            let _ = status_tx.send(EndpointStatus::Failed(e.to_string()));
            return;
        }
    };

    runtime.block_on(async {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                debug!("debug endpoint failed to bind {addr}: {e}");
                let _ = status_tx.send(EndpointStatus::Failed(format!("bind {addr}: {e}")));
                return;
            }
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(e) => {
                let _ = status_tx.send(EndpointStatus::Failed(e.to_string()));
                return;
            }
        };
        let _ = status_tx.send(EndpointStatus::Listening(local));
        info!("debug endpoint listening on http://{local}/debug/vars");

        if let Err(e) = axum::serve(listener, router()).await {
            debug!("debug endpoint on {local} stopped: {e}");
        }
    });
}

/// Routes served by the debug endpoint
pub fn router() -> Router {
    Router::new()
        .route("/debug/vars", get(vars))
        .route("/debug/pprof/heap", get(heap_profile))
}

async fn vars() -> Json<JsonValue> {
    Json(registry().render())
}

async fn heap_profile() -> Response {
    match HeapSnapshot::capture().to_gzipped_pprof() {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/octet-stream"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"heap\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
