//! HTTP surface for the run coordinator.
//!
//! ```text
//! POST /api/upload    -> handlers::upload
//! POST /api/start     -> handlers::start
//! POST /api/stop      -> handlers::stop
//! GET  /api/logs      -> handlers::logs
//! GET  /api/scripts   -> handlers::list
//! POST /api/resubmit  -> handlers::resubmit
//! GET  /health        -> handlers::health
//! ```
//!
//! Any other method on these paths answers 405 with the JSON error body.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::engine::RunCoordinator;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult};

/// Shared state available to handlers via `State<AppState>`.
#[derive(Clone, Debug)]
pub struct AppState {
    pub coordinator: RunCoordinator,
}

/// Build the full router with tracing.
pub fn router(coordinator: RunCoordinator) -> Router {
    let state = AppState { coordinator };

    let api = Router::new()
        .route(
            "/upload",
            post(handlers::upload).fallback(handlers::method_not_allowed),
        )
        .route(
            "/start",
            post(handlers::start).fallback(handlers::method_not_allowed),
        )
        .route(
            "/stop",
            post(handlers::stop).fallback(handlers::method_not_allowed),
        )
        .route(
            "/logs",
            get(handlers::logs).fallback(handlers::method_not_allowed),
        )
        .route(
            "/scripts",
            get(handlers::list).fallback(handlers::method_not_allowed),
        )
        .route(
            "/resubmit",
            post(handlers::resubmit).fallback(handlers::method_not_allowed),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
