use crate::health::{HealthChecker, HealthReport};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    status: &'static str,
    timestamp: String,
}

/// GET /health
pub async fn health_report(
    State(checker): State<Arc<HealthChecker>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = checker.check().await;
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        debug!(
            queue_connected = ?report.queue_connected,
            database_connected = report.database_connected,
            "Reporting unhealthy"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// GET /live
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
