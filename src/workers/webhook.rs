use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::sync::watch;

use crate::crypto;
use crate::models::{WebhookJob, JOB_STATUS_FAILED, JOB_STATUS_PENDING, JOB_STATUS_SUCCESS};
use crate::services::webhook_service::{self, WEBHOOK_QUEUE_KEY};
use crate::AppState;

const BRPOP_TIMEOUT_SECS: usize = 3;
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const TICK_SWEEP_LIMIT: i64 = 200;

/// Retry backoff by 1-based retry count, in milliseconds:
/// 1 minute, 5 minutes, 15 minutes, then capped at one hour.
pub fn backoff_ms(retry_count: i32) -> i64 {
    match retry_count {
        1 => 60_000,
        2 => 300_000,
        3 => 900_000,
        _ => 3_600_000,
    }
}

/// Delivery worker: pop job ids off the notify list and dispatch them.
pub async fn run_webhook_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let Some(redis) = state.redis.clone() else {
        return;
    };
    let client = reqwest::Client::builder()
        .timeout(DELIVERY_TIMEOUT)
        .build()
        .expect("failed to build webhook http client");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            popped = redis.brpop(WEBHOOK_QUEUE_KEY, BRPOP_TIMEOUT_SECS) => {
                match popped {
                    Ok(Some((_, raw))) => {
                        let Ok(job_id) = raw.parse::<i64>() else {
                            tracing::warn!(value = %raw, "discarding non-numeric webhook queue entry");
                            continue;
                        };
                        process_job(&state, &client, job_id).await;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "webhook queue pop failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Tick sweeper: periodically re-notify the oldest due PENDING jobs. This
/// recovers dropped notifications and drives retry scheduling.
pub async fn run_webhook_sweeper(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    if state.redis.is_none() {
        return;
    }
    let interval_secs = match state.runtime.config().webhook_retry_interval_seconds {
        s if s > 0 => s as u64,
        _ => 30,
    };
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let ids = match webhook_service::list_due_jobs(&state.db, now_ms, TICK_SWEEP_LIMIT) {
                    Ok(ids) => ids,
                    Err(e) => {
                        tracing::error!(error = %e, "listing due webhook jobs failed");
                        continue;
                    }
                };
                for id in ids {
                    if let Err(e) = webhook_service::notify_job(state.redis.as_ref(), id).await {
                        tracing::warn!(error = %e, job_id = id, "re-notify failed");
                    }
                }
            }
        }
    }
}

async fn process_job(state: &Arc<AppState>, client: &reqwest::Client, job_id: i64) {
    let job = match webhook_service::get_job(&state.db, job_id) {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, job_id, "loading webhook job failed");
            return;
        }
    };
    if job.status != JOB_STATUS_PENDING {
        return;
    }
    let now_ms = chrono::Utc::now().timestamp_millis();
    if job.next_retry_at > now_ms {
        // Not due yet; the sweeper re-notifies when it is.
        return;
    }

    let cfg = state.runtime.config();
    let secret = if job.secret.is_empty() {
        String::new()
    } else {
        let decrypted = crypto::load_secret_key(&cfg.webhook_secret_key)
            .and_then(|key| crypto::decrypt_secret(&job.secret, &key));
        match decrypted {
            Ok(secret) => secret,
            Err(e) => {
                tracing::error!(error = %e, job_id, "secret decryption failed, failing job");
                finish(state, &job, JOB_STATUS_FAILED, job.retry_count, job.next_retry_at);
                return;
            }
        }
    };

    let mut request = client
        .post(&job.url)
        .header(CONTENT_TYPE, "application/json")
        .header("X-Event-ID", job.id.to_string())
        .body(job.payload.clone());
    if !secret.is_empty() {
        request = request.header("X-Signature", crypto::sign_payload(&job.payload, &secret));
    }

    let outcome = request.send().await;
    match outcome {
        Ok(response) if response.status().is_success() => {
            tracing::info!(
                job_id,
                token = %job.token,
                status = response.status().as_u16(),
                attempts = job.retry_count + 1,
                "webhook delivered"
            );
            finish(state, &job, JOB_STATUS_SUCCESS, job.retry_count, job.next_retry_at);
        }
        Ok(response) => {
            tracing::warn!(
                job_id,
                token = %job.token,
                status = response.status().as_u16(),
                "webhook delivery got non-2xx"
            );
            schedule_retry(state, &job);
        }
        Err(e) => {
            tracing::warn!(job_id, token = %job.token, error = %e, "webhook delivery failed");
            schedule_retry(state, &job);
        }
    }
}

fn schedule_retry(state: &Arc<AppState>, job: &WebhookJob) {
    let retry_count = job.retry_count + 1;
    if retry_count >= state.runtime.config().webhook_max_retries {
        tracing::error!(job_id = job.id, token = %job.token, retry_count, "webhook retries exhausted");
        finish(state, job, JOB_STATUS_FAILED, retry_count, job.next_retry_at);
        return;
    }
    let now_ms = chrono::Utc::now().timestamp_millis();
    let next_retry_at = now_ms + backoff_ms(retry_count);
    finish(state, job, JOB_STATUS_PENDING, retry_count, next_retry_at);
}

fn finish(state: &Arc<AppState>, job: &WebhookJob, status: &str, retry_count: i32, next_retry_at: i64) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    if let Err(e) =
        webhook_service::update_job(&state.db, job.id, status, retry_count, next_retry_at, now_ms)
    {
        tracing::error!(error = %e, job_id = job.id, "webhook job update failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule() {
        assert_eq!(backoff_ms(1), 60_000);
        assert_eq!(backoff_ms(2), 300_000);
        assert_eq!(backoff_ms(3), 900_000);
        assert_eq!(backoff_ms(4), 3_600_000);
        assert_eq!(backoff_ms(10), 3_600_000);
    }
}
