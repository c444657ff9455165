use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::services::record_service;
use crate::AppState;

/// Record retention: periodically delete observations older than the
/// configured horizon, in bounded batches.
pub async fn run_retention_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let cfg = state.runtime.config();
    if !cfg.retention_enabled || cfg.record_retention_days <= 0 {
        return;
    }
    let interval_secs = match cfg.retention_interval_seconds {
        s if s > 0 => s as u64,
        _ => 3600,
    };
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let cutoff_ms = chrono::Utc::now().timestamp_millis()
                    - cfg.record_retention_days * 24 * 3600 * 1000;
                match record_service::delete_old_records(&state.db, cutoff_ms, cfg.retention_batch_size) {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "retention cleanup"),
                    Err(e) => tracing::error!(error = %e, "retention cleanup failed"),
                }
            }
        }
    }
}
