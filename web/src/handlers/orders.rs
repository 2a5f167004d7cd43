//! Order lookup endpoints.

use crate::{AppError, AppState, WebResult};
use axum::{
    Json,
    extract::{Path, State},
};
use order_stream_core::Order;
use order_stream_runtime::LookupOutcome;

/// Get one order by id.
///
/// Served from the cache when possible; a cache miss falls back to the store and caches the
/// result.
///
/// # Endpoint
///
/// ```text
/// GET /order/:order_uid
/// ```
///
/// # Status Codes
///
/// - 200 OK: order JSON
/// - 404 Not Found: no such order
/// - 500 Internal Server Error: cache miss and the store read failed
///
/// # Errors
///
/// Returns [`AppError`] for the 404 and 500 cases.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> WebResult<Json<Order>> {
    match state.lookup.get_by_id(&order_uid).await {
        LookupOutcome::HitCache(order) => {
            tracing::debug!(order_uid = %order_uid, "Order served from cache");
            Ok(Json(order))
        }
        LookupOutcome::HitStore(order) => {
            tracing::debug!(order_uid = %order_uid, "Order served from store");
            Ok(Json(order))
        }
        LookupOutcome::NotFound => {
            tracing::info!(order_uid = %order_uid, "Order not found");
            Err(AppError::not_found("Order", order_uid))
        }
        LookupOutcome::StoreFailure(e) => Err(e.into()),
    }
}

/// List every cached order.
///
/// Diagnostic listing straight from the cache; the store is not consulted.
///
/// # Endpoint
///
/// ```text
/// GET /orders
/// ```
pub async fn list_orders(State(state): State<AppState>) -> Json<Vec<Order>> {
    let mut orders = state.lookup.snapshot();
    orders.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
    Json(orders)
}
