use crate::controller::{admin_controller, health_check_controller, publish_controller};
use crate::error::WebErrorKind;
use crate::{sse, AppState, Error};
use axum::{
    routing::{get, post},
    Router,
};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Log Stream Broker API"
        ),
        paths(
            sse::handler::stream_logs,
            publish_controller::publish,
            publish_controller::publish_test,
            health_check_controller::health_check,
            health_check_controller::welcome,
            admin_controller::stats,
        ),
        components(
            schemas(
                publish_controller::PublishRequest,
                publish_controller::PublishResponse,
            )
        ),
        tags(
            (name = "log_stream_broker", description = "Channel-addressed SSE broker for real-time log records")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(stream_routes(app_state.clone()))
        .merge(publish_routes(app_state.clone()))
        .merge(health_routes(app_state.clone()))
        .merge(admin_routes(app_state.clone()))
        .merge(test_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .fallback(not_found)
}

fn stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/logs/stream", get(sse::handler::stream_logs))
        .with_state(app_state)
}

fn publish_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/logs/publish", post(publish_controller::publish))
        .with_state(app_state)
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check_controller::welcome))
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

fn admin_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/admin/logs/stats", get(admin_controller::stats))
        .with_state(app_state)
}

fn test_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/test/logs", post(publish_controller::publish_test))
        .with_state(app_state)
}

async fn not_found() -> Error {
    Error::Web(WebErrorKind::NotFound)
}
