use axum::{extract::State, Json};
use chrono::Utc;

use crate::api::{state::AppState, types::*};

/// GET /api/health -- liveness check
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /api/queue/stats -- job counters
pub async fn queue_stats_handler(State(state): State<AppState>) -> Json<QueueStatsResponse> {
    let stats = state.queue.stats().await;
    Json(QueueStatsResponse {
        waiting: stats.waiting,
        active: stats.active,
        completed: stats.completed,
        failed: stats.failed,
        uptime_secs: state.uptime_seconds(),
    })
}
