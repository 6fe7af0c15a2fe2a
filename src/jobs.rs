use std::sync::Arc;

use crate::AppState;

/// Keeps the exchange rate cache warm so request paths rarely pay the
/// provider round-trip. A failed refresh installs the fallback table, which
/// expires sooner and gets retried here.
pub async fn rate_refresh_task(state: Arc<AppState>) {
    // Create a Tokio interval. The first tick fires immediately.
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(state.rate_refresh_interval));

    loop {
        // Wait for the next interval tick
        interval.tick().await;
        tracing::info!("Running rate_refresh_task...");

        if state.tracker.rates().force_refresh().await {
            tracing::info!("Exchange rates refreshed from provider");
        } else {
            tracing::warn!("Rate provider unreachable, fallback table installed");
        }
    }
}
