// handlers/public/health.rs - GET /health liveness check
use axum::response::IntoResponse;
use serde_json::json;

use crate::envelope::Envelope;

pub async fn health() -> impl IntoResponse {
    Envelope::success(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}
