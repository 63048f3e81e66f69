use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions", post(handlers::start_session))
        .route("/sessions/:session_id", get(handlers::get_session_status))
        .route("/sessions/:session_id/audio", post(handlers::ingest_chunk))
        .route(
            "/sessions/:session_id/finalize",
            post(handlers::finalize_session),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        // Browser recorders upload cross-origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
