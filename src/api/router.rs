// src/api/router.rs
// HTTP router composition.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{
    chat_handler, get_product_handler, get_session_handler, health_handler, recommend_compare_handler,
    recommend_handler, reset_session_handler, search_handler, status_handler,
};

/// Main HTTP router. Nested under /api, with the bare paths aliased for the
/// CLI demo and curl convenience.
pub fn http_router(app_state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/chat", post(chat_handler))
        .route("/session/{id}", get(get_session_handler))
        .route("/session/reset", post(reset_session_handler))
        .route("/search", post(search_handler))
        .route("/product/{id}", get(get_product_handler))
        .route("/recommend", post(recommend_handler))
        .route("/recommend/compare", post(recommend_compare_handler));

    Router::new()
        .nest("/api", routes.clone())
        .merge(routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
