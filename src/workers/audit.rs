use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::models::AuditEntry;
use crate::services::audit_service::{self, AUDIT_QUEUE_KEY};
use crate::AppState;

const BRPOP_TIMEOUT_SECS: usize = 3;

/// Drain the audit queue into the table.
pub async fn run_audit_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let Some(redis) = state.redis.clone() else {
        return;
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            popped = redis.brpop(AUDIT_QUEUE_KEY, BRPOP_TIMEOUT_SECS) => {
                match popped {
                    Ok(Some((_, raw))) => {
                        let entry: AuditEntry = match serde_json::from_str(&raw) {
                            Ok(entry) => entry,
                            Err(e) => {
                                tracing::error!(error = %e, "decoding audit entry failed");
                                continue;
                            }
                        };
                        if let Err(e) = audit_service::insert(&state.db, &entry) {
                            tracing::error!(error = %e, "audit log write failed");
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "audit queue pop failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
