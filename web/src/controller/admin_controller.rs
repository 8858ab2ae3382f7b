use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

/// GET per-channel subscriber statistics and global counters
#[utoipa::path(
    get,
    path = "/admin/logs/stats",
    responses(
        (status = 200, description = "Per-channel records with subscriber details, plus global counters")
    )
)]
pub async fn stats(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(app_state.broker_ref().admin_stats())
}
