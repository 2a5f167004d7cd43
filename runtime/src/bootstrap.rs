//! Startup cache warm-up.

use crate::cache::{OrderCache, RestoreError};
use crate::metrics::CacheMetrics;
use order_stream_core::OrderStore;
use std::time::{Duration, Instant};

/// Default time allowed for the startup bulk load.
pub const DEFAULT_RESTORE_DEADLINE: Duration = Duration::from_secs(10);

/// Load every stored order into the cache.
///
/// Must complete before the HTTP server starts accepting lookups. The bulk load is abandoned
/// if it runs past `deadline`; in that case the cache is left untouched.
///
/// Returns the number of cached orders.
///
/// # Errors
///
/// - [`RestoreError::Load`]: the store could not produce its orders
/// - [`RestoreError::DeadlineExceeded`]: the load took longer than `deadline`
pub async fn restore_cache(
    cache: &OrderCache,
    store: &dyn OrderStore,
    deadline: Duration,
) -> Result<usize, RestoreError> {
    tracing::info!(deadline = ?deadline, "Restoring cache from store");
    let started = Instant::now();

    let restored =
        match tokio::time::timeout(deadline, cache.restore_from_store(|| store.find_all())).await {
            Ok(result) => result,
            Err(_) => Err(RestoreError::DeadlineExceeded(deadline)),
        };

    match &restored {
        Ok(count) => {
            CacheMetrics::record_restore(started.elapsed());
            tracing::info!(
                orders = count,
                elapsed_ms = started.elapsed().as_millis(),
                "Cache restored"
            );
        }
        Err(e) => tracing::error!(error = %e, "Cache restore failed"),
    }

    restored
}
