use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// GET broker health and headline counters
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Broker is up; body carries connection and channel counts, uptime, and global counters")
    )
)]
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(app_state.broker_ref().health())
}

/// GET welcome document listing the available endpoints
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name and endpoint map")
    )
)]
pub async fn welcome() -> impl IntoResponse {
    Json(json!({
        "message": "Log stream broker is running!",
        "endpoints": {
            "health": "/health",
            "logs_stream": "/api/logs/stream",
            "logs_publish": "/api/logs/publish",
            "stats": "/admin/logs/stats"
        }
    }))
}
