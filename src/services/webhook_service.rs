use diesel::prelude::*;

use crate::clients::db::{get_conn, DbPool};
use crate::clients::redis::RedisClient;
use crate::config::AppConfig;
use crate::crypto::{self, CryptoError};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{
    NewTokenWebhook, NewWebhookJob, TokenWebhook, WebhookJob, JOB_STATUS_PENDING,
    WEBHOOK_MODE_EACH_HIT, WEBHOOK_MODE_FIRST_HIT,
};
use crate::schema::{token_webhooks, webhook_jobs};

pub const WEBHOOK_QUEUE_KEY: &str = "webhook:queue";

fn crypto_error(err: CryptoError) -> AppError {
    match err {
        CryptoError::SecretKeyRequired | CryptoError::InvalidSecretKey => {
            AppError::code(ErrorCode::WebhookSecretKeyRequired)
        }
        other => AppError::Internal(other.into()),
    }
}

fn secret_key(cfg: &AppConfig) -> Result<[u8; 32], CryptoError> {
    crypto::load_secret_key(&cfg.webhook_secret_key)
}

/// Bind (or rebind) a webhook to a token. The secret is encrypted before
/// it touches the store; rebinding re-enables a disabled binding.
pub fn upsert_binding(
    pool: &DbPool,
    cfg: &AppConfig,
    token: &str,
    url: &str,
    secret_plain: &str,
    mode: &str,
    now_ms: i64,
) -> AppResult<()> {
    let stored_secret = if secret_plain.is_empty() {
        String::new()
    } else {
        let key = secret_key(cfg).map_err(crypto_error)?;
        crypto::encrypt_secret(secret_plain, &key).map_err(crypto_error)?
    };

    let mut conn = get_conn(pool)?;
    diesel::insert_into(token_webhooks::table)
        .values(&NewTokenWebhook {
            token: token.to_string(),
            webhook_url: url.to_string(),
            secret: stored_secret.clone(),
            mode: mode.to_string(),
            enabled: true,
            created_at: now_ms,
        })
        .on_conflict(token_webhooks::token)
        .do_update()
        .set((
            token_webhooks::webhook_url.eq(url.to_string()),
            token_webhooks::secret.eq(stored_secret),
            token_webhooks::mode.eq(mode.to_string()),
            token_webhooks::enabled.eq(true),
        ))
        .execute(&mut conn)?;
    Ok(())
}

/// Fetch the binding with the secret still in its stored form.
pub fn get_binding(pool: &DbPool, token: &str) -> AppResult<Option<TokenWebhook>> {
    let mut conn = get_conn(pool)?;
    let binding = token_webhooks::table
        .filter(token_webhooks::token.eq(token))
        .first::<TokenWebhook>(&mut conn)
        .optional()?;
    Ok(binding)
}

pub fn disable_binding(pool: &DbPool, token: &str) -> AppResult<()> {
    let mut conn = get_conn(pool)?;
    diesel::update(token_webhooks::table.filter(token_webhooks::token.eq(token)))
        .set(token_webhooks::enabled.eq(false))
        .execute(&mut conn)?;
    Ok(())
}

/// Capture-path entry point: decide whether this hit produces a job, and
/// if so insert it and signal the worker queue.
///
/// The job row is durable before the LPUSH; a lost notification is
/// recovered by the tick sweeper, so an LPUSH failure surfaces to the
/// caller but must not be treated as losing the delivery.
pub async fn maybe_enqueue(
    pool: &DbPool,
    redis: Option<&RedisClient>,
    cfg: &AppConfig,
    token: &str,
    domain: &str,
    is_first: bool,
) -> AppResult<()> {
    if !cfg.webhook_enabled {
        return Ok(());
    }
    let Some(binding) = get_binding(pool, token)? else {
        return Ok(());
    };
    if !binding.enabled {
        return Ok(());
    }
    match binding.mode.as_str() {
        WEBHOOK_MODE_FIRST_HIT => {
            if !is_first {
                return Ok(());
            }
        }
        WEBHOOK_MODE_EACH_HIT => {}
        other => {
            return Err(AppError::Validation(format!("invalid webhook mode: {other}")));
        }
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let payload = serde_json::json!({
        "token": token,
        "domain": domain,
        "hit_count": 1,
        "timestamp": now_ms,
    })
    .to_string();

    // Re-encrypt under a fresh nonce so the job carries its own blob.
    let job_secret = if binding.secret.is_empty() {
        String::new()
    } else {
        let key = secret_key(cfg).map_err(crypto_error)?;
        let plain = crypto::decrypt_secret(&binding.secret, &key).map_err(crypto_error)?;
        crypto::encrypt_secret(&plain, &key).map_err(crypto_error)?
    };

    let job_id = create_job(
        pool,
        NewWebhookJob {
            token: token.to_string(),
            url: binding.webhook_url.clone(),
            payload,
            secret: job_secret,
            status: JOB_STATUS_PENDING.to_string(),
            retry_count: 0,
            next_retry_at: now_ms,
            created_at: now_ms,
            updated_at: now_ms,
        },
    )?;

    notify_job(redis, job_id).await
}

pub async fn notify_job(redis: Option<&RedisClient>, job_id: i64) -> AppResult<()> {
    let Some(client) = redis else {
        return Err(AppError::Internal(anyhow::anyhow!("redis not initialized")));
    };
    client
        .lpush(WEBHOOK_QUEUE_KEY, &job_id.to_string())
        .await
        .map_err(|e| AppError::Internal(e.into()))
}

pub fn create_job(pool: &DbPool, job: NewWebhookJob) -> AppResult<i64> {
    let mut conn = get_conn(pool)?;
    let id = diesel::insert_into(webhook_jobs::table)
        .values(&job)
        .returning(webhook_jobs::id)
        .get_result::<i64>(&mut conn)?;
    Ok(id)
}

pub fn get_job(pool: &DbPool, id: i64) -> AppResult<Option<WebhookJob>> {
    let mut conn = get_conn(pool)?;
    let job = webhook_jobs::table
        .filter(webhook_jobs::id.eq(id))
        .first::<WebhookJob>(&mut conn)
        .optional()?;
    Ok(job)
}

pub fn update_job(
    pool: &DbPool,
    id: i64,
    status: &str,
    retry_count: i32,
    next_retry_at: i64,
    updated_at: i64,
) -> AppResult<()> {
    let mut conn = get_conn(pool)?;
    diesel::update(webhook_jobs::table.filter(webhook_jobs::id.eq(id)))
        .set((
            webhook_jobs::status.eq(status),
            webhook_jobs::retry_count.eq(retry_count),
            webhook_jobs::next_retry_at.eq(next_retry_at),
            webhook_jobs::updated_at.eq(updated_at),
        ))
        .execute(&mut conn)?;
    Ok(())
}

/// Ids of the oldest due PENDING jobs, for the tick sweeper.
pub fn list_due_jobs(pool: &DbPool, now_ms: i64, limit: i64) -> AppResult<Vec<i64>> {
    let mut conn = get_conn(pool)?;
    let limit = if limit <= 0 { 200 } else { limit };
    let ids = webhook_jobs::table
        .filter(webhook_jobs::status.eq(JOB_STATUS_PENDING))
        .filter(webhook_jobs::next_retry_at.le(now_ms))
        .order(webhook_jobs::next_retry_at.asc())
        .limit(limit)
        .select(webhook_jobs::id)
        .load::<i64>(&mut conn)?;
    Ok(ids)
}

/// One-shot migration: re-encrypt any legacy plaintext secrets left in
/// the store from before the encryption key existed.
pub fn reencrypt_legacy_secrets(pool: &DbPool, cfg: &AppConfig) -> AppResult<usize> {
    let key = secret_key(cfg).map_err(crypto_error)?;
    let mut conn = get_conn(pool)?;
    let mut migrated = 0usize;

    let bindings: Vec<(i64, String)> = token_webhooks::table
        .filter(token_webhooks::secret.ne(""))
        .filter(token_webhooks::secret.not_like("enc:%"))
        .select((token_webhooks::id, token_webhooks::secret))
        .load(&mut conn)?;
    for (id, secret) in bindings {
        let encrypted = crypto::encrypt_secret(&secret, &key).map_err(crypto_error)?;
        diesel::update(token_webhooks::table.filter(token_webhooks::id.eq(id)))
            .set(token_webhooks::secret.eq(encrypted))
            .execute(&mut conn)?;
        migrated += 1;
    }

    let jobs: Vec<(i64, String)> = webhook_jobs::table
        .filter(webhook_jobs::secret.ne(""))
        .filter(webhook_jobs::secret.not_like("enc:%"))
        .select((webhook_jobs::id, webhook_jobs::secret))
        .load(&mut conn)?;
    for (id, secret) in jobs {
        let encrypted = crypto::encrypt_secret(&secret, &key).map_err(crypto_error)?;
        diesel::update(webhook_jobs::table.filter(webhook_jobs::id.eq(id)))
            .set(webhook_jobs::secret.eq(encrypted))
            .execute(&mut conn)?;
        migrated += 1;
    }

    Ok(migrated)
}
