use diesel::prelude::*;

use crate::clients::db::{get_conn, DbPool};
use crate::clients::redis::RedisClient;
use crate::errors::AppResult;
use crate::models::AuditEntry;
use crate::schema::audit_logs;

pub const AUDIT_QUEUE_KEY: &str = "audit:queue";

pub fn insert(pool: &DbPool, entry: &AuditEntry) -> AppResult<()> {
    let mut conn = get_conn(pool)?;
    diesel::insert_into(audit_logs::table)
        .values(entry)
        .execute(&mut conn)?;
    Ok(())
}

/// Queue an audit entry for the drain worker. When the cache is missing
/// or the push fails, the entry goes straight to the table instead.
pub async fn enqueue(pool: &DbPool, redis: Option<&RedisClient>, entry: AuditEntry) {
    if let Some(client) = redis {
        match serde_json::to_string(&entry) {
            Ok(data) => match client.lpush(AUDIT_QUEUE_KEY, &data).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "audit queue push failed, writing synchronously");
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "audit entry serialization failed");
                return;
            }
        }
    }

    if let Err(e) = insert(pool, &entry) {
        tracing::error!(error = %e, "audit log write failed");
    }
}
