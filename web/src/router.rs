//! Router configuration.
//!
//! Builds the complete Axum router with all endpoints and the shared layers.

use crate::AppState;
use crate::handlers::{get_order, health_check, list_orders, readiness_check, render_metrics};
use axum::{Router, routing::get};
use std::time::Duration;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Requests running longer than `request_timeout` are answered with 408.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let index = ServeFile::new(state.index_file());
    let assets = ServeDir::new(&state.static_dir);

    Router::new()
        // Lookup
        .route("/order/:order_uid", get(get_order))
        .route("/orders", get(list_orders))
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(render_metrics))
        // Lookup page
        .route_service("/", index)
        .nest_service("/static", assets)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
