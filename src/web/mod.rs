//! # Health Endpoint
//!
//! HTTP surface of a running consumer, for load balancers and orchestrators:
//!
//! - `GET /health` - full [`HealthReport`](crate::health::HealthReport);
//!   `200` when healthy, `503` otherwise
//! - `GET /live` - process liveness, always `200`

pub mod health;

use crate::health::HealthChecker;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub fn router(checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/health", get(health::health_report))
        .route("/live", get(health::liveness))
        .with_state(checker)
}

/// Serve the health routes on `listener` until `shutdown` flips to `true`
pub async fn serve(
    listener: TcpListener,
    checker: Arc<HealthChecker>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let local_addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(address = ?local_addr, "Health endpoint listening");

    axum::serve(listener, router(checker))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
