use domain::authenticator::TokenMapAuthenticator;
use domain::principal::HeaderPrincipalResolver;
use log::*;
use service::{config::Config, logging, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    logging::init(&config);

    let broker = Arc::new(broker::Manager::new(config.send_queue_capacity));
    let principal_resolver = Arc::new(HeaderPrincipalResolver::new());
    let service_authenticator = Arc::new(TokenMapAuthenticator::new(config.service_token_map()));

    let address = config.server_address();
    let app_state = AppState::new(
        config,
        Arc::clone(&broker),
        principal_resolver,
        service_authenticator,
    );
    let router = web::init_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {address}: {e}");
            std::process::exit(1);
        }
    };
    info!("Log stream broker listening on http://{address}");

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal(broker));
    if let Err(e) = server.await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Resolves when the process receives SIGINT or SIGTERM, after signalling
/// every subscriber writer to close.
async fn shutdown_signal(broker: Arc<broker::Manager>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {e}"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, closing log stream connections");
    broker.shutdown();
}
