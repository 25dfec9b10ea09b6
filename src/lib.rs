//! Library surface: every module plus the pieces needed to assemble and
//! exercise the service without actually binding a socket, so the
//! integration suite under `tests/` can drive the whole pipeline —
//! ConnectionRegistry through to outbound messages — the way a real
//! duplex client would.

pub mod cards;
pub mod clock;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod handlers;
pub mod player;
pub mod protocol;
pub mod room;
pub mod session;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use connection::ConnectionRegistry;
use coordinator::{CoordinatorConfig, CoordinatorManager};
use session::SessionStore;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub coordinators: Arc<CoordinatorManager>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, config: Arc<Config>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(store.clone()));
        let coordinators =
            Arc::new(CoordinatorManager::new(registry.clone(), store, CoordinatorConfig::from(config.as_ref())));
        AppState { registry, coordinators, config }
    }
}

/// Assemble the router: `/health` plus the single `/ws` duplex endpoint,
/// wrapped with the same tracing/CORS layers as the teacher's `main.rs`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(handlers::ws_handler))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "hokm-server" }))
}
