//! Health, stats and metrics endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::metrics::encode_metrics;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct QueueStats {
    name: String,
    dlq: Option<String>,
    depth: usize,
    dlq_depth: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    registered_partners: usize,
    queues: Vec<QueueStats>,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let mut queues = Vec::new();
    let mut names = state.queue_backend.queue_names();
    names.sort();
    for name in names {
        let depth = state.queue_backend.browse(&name).await?.len();
        let dlq_depth = state.queue_backend.browse_dlq(&name).await?.len();
        queues.push(QueueStats {
            dlq: state.queue_backend.dlq_name(&name),
            name,
            depth,
            dlq_depth,
        });
    }

    Ok(Json(StatsResponse {
        registered_partners: state.partner_registry.len(),
        queues,
    }))
}

pub async fn metrics() -> Result<String> {
    encode_metrics().map_err(|e| AppError::Internal(e.to_string()))
}
