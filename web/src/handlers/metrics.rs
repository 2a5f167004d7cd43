//! Prometheus scrape endpoint.

use crate::{AppError, AppState, WebResult};
use axum::{extract::State, http::header, response::IntoResponse};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Render the current metrics in the Prometheus text format.
///
/// # Errors
///
/// Returns 404 when metrics are disabled or the recorder was installed elsewhere.
#[allow(clippy::unused_async)]
pub async fn render_metrics(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    let body = state
        .metrics
        .as_ref()
        .and_then(|server| server.render())
        .ok_or_else(|| AppError::not_found("Endpoint", "/metrics"))?;

    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body))
}
