//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Liveness check.
///
/// Returns 200 OK while the process is running. Does not touch the store.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Orders currently held in the cache
    pub cache_entries: usize,
    /// Orders in the store, `None` when it could not be counted
    pub store_orders: Option<usize>,
}

/// Readiness check.
///
/// Ready once the cache has been restored and the store answers.
///
/// # Status Codes
///
/// - 200 OK: bootstrap completed and the store is reachable
/// - 503 Service Unavailable: bootstrap still running, or the store query failed
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"cache_entries":3,"store_orders":3}
/// ```
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let cache_entries = state.lookup.cache().len();

    if !state.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                cache_entries,
                store_orders: None,
            }),
        );
    }

    match state.lookup.store().count().await {
        Ok(count) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                cache_entries,
                store_orders: Some(count),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check could not reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    cache_entries,
                    store_orders: None,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
