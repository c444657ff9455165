use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::services::token_service;
use crate::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SWEEP_BATCH: i64 = 500;

/// Token expiry sweep: every minute, flip due tokens to EXPIRED in
/// batches and log how many moved.
pub async fn run_expire_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                match token_service::sweep_expired(&state.db, now_ms, SWEEP_BATCH) {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(count, "expired tokens updated"),
                    Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                }
            }
        }
    }
}
