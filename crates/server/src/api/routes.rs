use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use super::{handlers, middleware::metrics_middleware, session, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let ui_dir = state.config().server.ui_dir.clone();
    let upload_limit = state.config().server.max_upload_bytes();

    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Session
        .route("/session", get(session::get_session))
        .route(
            "/session/input",
            post(session::upload_input).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/session/convert", post(session::start_conversion))
        .route("/session/download", get(session::download_output))
        .route("/session/reset", post(session::reset_session))
        // Transient URLs (input preview)
        .route("/blobs/{id}", get(session::get_blob))
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    // Serve the page with index fallback
    let index_path = ui_dir.join("index.html");
    let serve_dir = ServeDir::new(&ui_dir).fallback(ServeFile::new(index_path));

    Router::new()
        .nest("/api/v1", api_routes)
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
}
