//! Entry point: wires configuration, the SessionStore, and the rest of
//! `hokm_server`'s `AppState` together behind the router, then serves
//! until asked to shut down.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hokm_server::session::{RedisSessionStore, SessionStore};
use hokm_server::{build_router, config, connection::ConnectionRegistry, AppState};

#[tokio::main]
async fn main() {
    config::load_env();
    let config = Arc::new(config::validate_env());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn SessionStore> = Arc::new(
        RedisSessionStore::connect(&config.store_endpoint, config.session_ttl, config.session_ttl)
            .await
            .expect("failed to connect to the session store"),
    );

    let state = AppState::new(store, config.clone());
    let registry = state.registry.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_address)
        .await
        .expect("failed to bind the configured listen address");
    tracing::info!(address = %config.listen_address, "hokm server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .expect("server loop exited with an error");
}

/// Waits for Ctrl-C, then gives in-flight Rooms a brief window to flush
/// their final broadcasts before closing every connection (§5: "drains
/// each room queue for up to 5s ... then closes connections with a
/// server-shutting-down code").
async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    tokio::signal::ctrl_c().await.expect("failed to listen for the shutdown signal");
    tracing::info!("shutdown signal received, draining connections");
    tokio::time::sleep(Duration::from_secs(5)).await;
    registry.close_all("server-shutting-down");
}
