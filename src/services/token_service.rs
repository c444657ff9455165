use diesel::prelude::*;
use diesel::sql_types::BigInt;
use uuid::Uuid;

use crate::clients::db::{get_conn, is_unique_violation, DbPool};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{
    NewToken, TokenStatus, TOKEN_STATUS_EXPIRED, TOKEN_STATUS_HIT, TOKEN_STATUS_INIT,
};
use crate::schema::dns_tokens;

const ALLOCATE_MAX_ATTEMPTS: usize = 5;
const TOKEN_LEN: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    pub page: i64,
    pub page_size: i64,
    pub status: Option<String>,
    pub keyword: Option<String>,
    pub created_start: Option<i64>,
    pub created_end: Option<i64>,
    pub last_start: Option<i64>,
    pub last_end: Option<i64>,
    /// "created_at" (default) or "last_seen".
    pub order_by: String,
    pub ascending: bool,
}

/// Allocate a fresh token under `root` and persist it as INIT.
///
/// The token is the first 10 hex characters of a v4 UUID; a duplicate key
/// retries with a new draw, up to five times.
pub fn allocate(pool: &DbPool, root: &str, now_ms: i64, ttl_ms: i64) -> AppResult<(String, String)> {
    let mut conn = get_conn(pool)?;

    for _ in 0..ALLOCATE_MAX_ATTEMPTS {
        let id = Uuid::new_v4().simple().to_string();
        let token = id[..TOKEN_LEN].to_string();
        let domain = format!("{token}.{root}");

        let row = NewToken {
            token: token.clone(),
            domain: domain.clone(),
            status: TOKEN_STATUS_INIT.to_string(),
            hit_count: 0,
            first_seen: 0,
            last_seen: 0,
            created_at: now_ms,
            updated_at: now_ms,
            expires_at: now_ms + ttl_ms,
        };

        match diesel::insert_into(dns_tokens::table)
            .values(&row)
            .execute(&mut conn)
        {
            Ok(_) => return Ok((domain, token)),
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(anyhow::anyhow!(
        "token allocation exhausted after {ALLOCATE_MAX_ATTEMPTS} attempts"
    )))
}

/// Record a hit on `token`, creating the row if absent.
///
/// Returns `true` iff the resulting hit count is 1 (the first hit). The
/// whole operation runs in a row-locking transaction so racing hits on a
/// fresh INIT token serialize on the row; a racing insert that loses the
/// unique index is retried once and lands on the update path. EXPIRED
/// rows are frozen: only `updated_at` moves.
pub fn upsert_hit(
    pool: &DbPool,
    token: &str,
    domain: &str,
    now_ms: i64,
    ttl_ms: i64,
) -> AppResult<bool> {
    let mut conn = get_conn(pool)?;

    let mut attempt = 0;
    loop {
        let result = conn.transaction::<bool, diesel::result::Error, _>(|conn| {
            let existing: Option<TokenStatus> = dns_tokens::table
                .filter(dns_tokens::token.eq(token))
                .for_update()
                .first(conn)
                .optional()?;

            match existing {
                None => {
                    let row = NewToken {
                        token: token.to_string(),
                        domain: domain.to_string(),
                        status: TOKEN_STATUS_HIT.to_string(),
                        hit_count: 1,
                        first_seen: now_ms,
                        last_seen: now_ms,
                        created_at: now_ms,
                        updated_at: now_ms,
                        expires_at: now_ms + ttl_ms,
                    };
                    diesel::insert_into(dns_tokens::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(true)
                }
                Some(row) if row.status == TOKEN_STATUS_EXPIRED => {
                    diesel::update(dns_tokens::table.filter(dns_tokens::token.eq(token)))
                        .set(dns_tokens::updated_at.eq(now_ms))
                        .execute(conn)?;
                    Ok(false)
                }
                Some(row) => {
                    let hit_count = row.hit_count + 1;
                    let first_seen = if row.first_seen == 0 { now_ms } else { row.first_seen };
                    diesel::update(dns_tokens::table.filter(dns_tokens::token.eq(token)))
                        .set((
                            dns_tokens::hit_count.eq(hit_count),
                            dns_tokens::first_seen.eq(first_seen),
                            dns_tokens::last_seen.eq(now_ms),
                            dns_tokens::updated_at.eq(now_ms),
                            dns_tokens::expires_at.eq(now_ms + ttl_ms),
                            dns_tokens::status.eq(TOKEN_STATUS_HIT),
                        ))
                        .execute(conn)?;
                    Ok(hit_count == 1)
                }
            }
        });

        match result {
            Err(e) if is_unique_violation(&e) && attempt == 0 => {
                attempt += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
            Ok(is_first) => return Ok(is_first),
        }
    }
}

pub fn get_status(pool: &DbPool, token: &str) -> AppResult<TokenStatus> {
    let mut conn = get_conn(pool)?;
    dns_tokens::table
        .filter(dns_tokens::token.eq(token))
        .first::<TokenStatus>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::code(ErrorCode::TokenNotFound))
}

/// Transition a single token to EXPIRED if it is due. Returns whether a
/// row changed.
pub fn maybe_expire(pool: &DbPool, token: &str, now_ms: i64) -> AppResult<bool> {
    let mut conn = get_conn(pool)?;
    let affected = diesel::update(
        dns_tokens::table
            .filter(dns_tokens::token.eq(token))
            .filter(dns_tokens::status.ne(TOKEN_STATUS_EXPIRED))
            .filter(dns_tokens::expires_at.le(now_ms)),
    )
    .set((
        dns_tokens::status.eq(TOKEN_STATUS_EXPIRED),
        dns_tokens::updated_at.eq(now_ms),
    ))
    .execute(&mut conn)?;
    Ok(affected > 0)
}

/// Bulk expiry sweep, oldest-due first, capped by `limit`.
pub fn sweep_expired(pool: &DbPool, now_ms: i64, limit: i64) -> AppResult<usize> {
    let mut conn = get_conn(pool)?;
    let limit = if limit <= 0 { 200 } else { limit };
    let affected = diesel::sql_query(
        r#"
UPDATE dns_tokens
SET status = 'EXPIRED', updated_at = $1
WHERE token IN (
    SELECT token FROM dns_tokens
    WHERE status != 'EXPIRED' AND expires_at <= $2
    ORDER BY expires_at ASC
    LIMIT $3
)
"#,
    )
    .bind::<BigInt, _>(now_ms)
    .bind::<BigInt, _>(now_ms)
    .bind::<BigInt, _>(limit)
    .execute(&mut conn)?;
    Ok(affected)
}

pub fn list_tokens(pool: &DbPool, filter: &TokenFilter) -> AppResult<(Vec<TokenStatus>, i64)> {
    let mut conn = get_conn(pool)?;

    let total: i64 = filtered(filter).count().get_result(&mut conn)?;

    let mut query = filtered(filter);
    let by_last_seen = filter.order_by == "last_seen";
    query = match (by_last_seen, filter.ascending) {
        (true, true) => query.order(dns_tokens::last_seen.asc()),
        (true, false) => query.order(dns_tokens::last_seen.desc()),
        (false, true) => query.order(dns_tokens::created_at.asc()),
        (false, false) => query.order(dns_tokens::created_at.desc()),
    };

    let offset = (filter.page.max(1) - 1) * filter.page_size;
    let items = query
        .limit(filter.page_size)
        .offset(offset)
        .load::<TokenStatus>(&mut conn)?;

    Ok((items, total))
}

fn filtered(filter: &TokenFilter) -> dns_tokens::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = dns_tokens::table.into_boxed();
    if let Some(status) = &filter.status {
        query = query.filter(dns_tokens::status.eq(status.clone()));
    }
    if let Some(keyword) = &filter.keyword {
        let pattern = format!("%{keyword}%");
        query = query.filter(
            dns_tokens::token
                .like(pattern.clone())
                .or(dns_tokens::domain.like(pattern)),
        );
    }
    if let Some(start) = filter.created_start {
        query = query.filter(dns_tokens::created_at.ge(start));
    }
    if let Some(end) = filter.created_end {
        query = query.filter(dns_tokens::created_at.le(end));
    }
    if let Some(start) = filter.last_start {
        query = query.filter(dns_tokens::last_seen.ge(start));
    }
    if let Some(end) = filter.last_end {
        query = query.filter(dns_tokens::last_seen.le(end));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_draw_shape() {
        // same derivation allocate() uses
        let id = Uuid::new_v4().simple().to_string();
        let token = &id[..TOKEN_LEN];
        assert_eq!(token.len(), 10);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn status_constants() {
        assert_eq!(TOKEN_STATUS_INIT, "INIT");
        assert_eq!(TOKEN_STATUS_HIT, "HIT");
        assert_eq!(TOKEN_STATUS_EXPIRED, "EXPIRED");
    }
}
