use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::Monitor;
use crate::models::StatusSnapshot;

pub async fn get_status(State(monitor): State<Arc<Monitor>>) -> Json<StatusSnapshot> {
    Json(monitor.snapshot().await)
}

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new().route("/api/status", get(get_status)).with_state(monitor)
}

/// Serves the read-only status endpoint until cancelled. Bind failures are
/// logged and the rest of the process keeps running.
pub async fn start_server(port: u16, monitor: Arc<Monitor>, cancel: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Status endpoint could not bind {}: {}", addr, e);
            return;
        }
    };
    info!("Status endpoint: http://localhost:{}/api/status", port);
    let app = create_router(monitor);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
    {
        error!("Status endpoint failed: {}", e);
    }
}
