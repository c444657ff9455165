use diesel::prelude::*;

use crate::clients::db::{get_conn, DbPool};
use crate::clients::redis::RedisClient;
use crate::errors::{AppError, AppResult};
use crate::models::{BlacklistEntry, NewBlacklistEntry};
use crate::schema::ip_blacklist;

const BLACKLIST_SET_KEY: &str = "blacklist:ip";

/// Admission-path membership check.
///
/// The redis set is consulted first; a set hit is authoritative. On a
/// miss or a cache error the persistent table is the fallback, and an
/// enabled row repopulates the set. Store errors on this path degrade to
/// "not blacklisted" rather than blocking traffic.
pub async fn is_blacklisted(pool: &DbPool, redis: Option<&RedisClient>, ip: &str) -> bool {
    if ip.is_empty() {
        return false;
    }

    if let Some(client) = redis {
        match client.sismember(BLACKLIST_SET_KEY, ip).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "blacklist cache lookup failed, falling back to db");
            }
        }
    }

    let enabled = lookup_enabled(pool, ip).unwrap_or(false);
    if enabled {
        if let Some(client) = redis {
            let _ = client.sadd(BLACKLIST_SET_KEY, ip).await;
        }
    }
    enabled
}

fn lookup_enabled(pool: &DbPool, ip: &str) -> AppResult<bool> {
    let mut conn = get_conn(pool)?;
    let enabled = ip_blacklist::table
        .filter(ip_blacklist::ip.eq(ip))
        .select(ip_blacklist::enabled)
        .first::<bool>(&mut conn)
        .optional()?;
    Ok(enabled.unwrap_or(false))
}

/// Add (or re-enable) a blacklist entry and write through to the set.
pub async fn add(
    pool: &DbPool,
    redis: Option<&RedisClient>,
    ip: &str,
    reason: &str,
    now_ms: i64,
) -> AppResult<()> {
    {
        let mut conn = get_conn(pool)?;
        diesel::insert_into(ip_blacklist::table)
            .values(&NewBlacklistEntry {
                ip: ip.to_string(),
                reason: reason.to_string(),
                enabled: true,
                created_at: now_ms,
            })
            .on_conflict(ip_blacklist::ip)
            .do_update()
            .set((
                ip_blacklist::enabled.eq(true),
                ip_blacklist::reason.eq(reason.to_string()),
            ))
            .execute(&mut conn)?;
    }

    if let Some(client) = redis {
        if let Err(e) = client.sadd(BLACKLIST_SET_KEY, ip).await {
            tracing::warn!(error = %e, ip = %ip, "blacklist set write-through failed");
        }
    }
    Ok(())
}

/// Disable an entry by id and drop its IP from the set.
pub async fn disable(pool: &DbPool, redis: Option<&RedisClient>, id: i64) -> AppResult<()> {
    let ip = {
        let mut conn = get_conn(pool)?;
        let ip = ip_blacklist::table
            .filter(ip_blacklist::id.eq(id))
            .select(ip_blacklist::ip)
            .first::<String>(&mut conn)
            .optional()?
            .ok_or_else(AppError::not_found)?;

        diesel::update(ip_blacklist::table.filter(ip_blacklist::id.eq(id)))
            .set(ip_blacklist::enabled.eq(false))
            .execute(&mut conn)?;
        ip
    };

    if let Some(client) = redis {
        if let Err(e) = client.srem(BLACKLIST_SET_KEY, &ip).await {
            tracing::warn!(error = %e, ip = %ip, "blacklist set removal failed");
        }
    }
    Ok(())
}

pub fn list(pool: &DbPool, page: i64, page_size: i64) -> AppResult<(Vec<BlacklistEntry>, i64)> {
    let mut conn = get_conn(pool)?;
    let total: i64 = ip_blacklist::table.count().get_result(&mut conn)?;
    let offset = (page.max(1) - 1) * page_size;
    let items = ip_blacklist::table
        .order(ip_blacklist::id.desc())
        .limit(page_size)
        .offset(offset)
        .load::<BlacklistEntry>(&mut conn)?;
    Ok((items, total))
}
