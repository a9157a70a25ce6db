//! Drops expired keys from the in-process cache (every 5 minutes).

use crate::cache::MemoryCache;

pub async fn run(cache: &MemoryCache) {
    match cache.purge_expired() {
        Ok(0) => tracing::debug!("Cache sweep: nothing expired"),
        Ok(removed) => tracing::info!(removed, "Cache sweep: expired keys removed"),
        Err(e) => tracing::error!(error = %e, "Cache sweep failed"),
    }
}
