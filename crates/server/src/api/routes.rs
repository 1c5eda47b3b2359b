use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, reconciler};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Reconciler
        .route("/status", get(reconciler::get_status))
        .route("/settings", put(reconciler::update_settings))
        .route("/passes/announce", post(reconciler::run_announce_pass))
        .route("/passes/import", post(reconciler::run_import_pass))
        .route_layer(middleware::from_fn(metrics_middleware));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
