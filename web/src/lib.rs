//! HTTP surface for the log stream broker.
//!
//! Routes, controllers, the subscribe stream handler, and the translation of
//! domain errors into HTTP responses live here. The broker state itself is
//! owned by the `broker` crate and shared through [`AppState`].

use axum::http::{HeaderValue, Method};
use axum::Router;
use log::*;
use service::config::Config;
use tower_http::cors::{Any, CorsLayer};

pub(crate) mod controller;
pub mod error;
pub(crate) mod extractors;
pub mod router;
pub(crate) mod sse;

pub use error::Error;
pub use service::AppState;

/// Build the application router with CORS configured from the service config.
pub fn init_router(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);
    router::define_routes(app_state).layer(cors)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}
