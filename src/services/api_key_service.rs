use diesel::prelude::*;

use crate::clients::db::{get_conn, DbPool};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{ApiKey, NewApiKey};
use crate::schema::api_keys;

pub fn get_by_hash(pool: &DbPool, hash: &str) -> AppResult<Option<ApiKey>> {
    let mut conn = get_conn(pool)?;
    let key = api_keys::table
        .filter(api_keys::api_key.eq(hash))
        .first::<ApiKey>(&mut conn)
        .optional()?;
    Ok(key)
}

pub fn create(
    pool: &DbPool,
    name: &str,
    hash: &str,
    comment: &str,
    now_ms: i64,
) -> AppResult<i64> {
    let mut conn = get_conn(pool)?;
    let id = diesel::insert_into(api_keys::table)
        .values(&NewApiKey {
            name: name.to_string(),
            api_key: hash.to_string(),
            enabled: true,
            created_at: now_ms,
            last_used_at: 0,
            comment: comment.to_string(),
        })
        .returning(api_keys::id)
        .get_result::<i64>(&mut conn)?;
    Ok(id)
}

enum BootstrapTxError {
    Conflict,
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for BootstrapTxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Db(err)
    }
}

/// Bootstrap-window key creation.
///
/// Runs serializable: count the enabled keys, insert only when the count
/// is zero. Of two concurrent bootstrap callers exactly one commits; the
/// other sees either a non-zero count or a serialization failure, both of
/// which surface as `api_key_already_initialized`.
pub fn create_bootstrap(
    pool: &DbPool,
    name: &str,
    hash: &str,
    comment: &str,
    now_ms: i64,
) -> AppResult<i64> {
    let mut conn = get_conn(pool)?;

    let result = conn
        .build_transaction()
        .serializable()
        .run::<i64, BootstrapTxError, _>(|conn| {
            let enabled_count: i64 = api_keys::table
                .filter(api_keys::enabled.eq(true))
                .count()
                .get_result(conn)?;
            if enabled_count > 0 {
                return Err(BootstrapTxError::Conflict);
            }
            let id = diesel::insert_into(api_keys::table)
                .values(&NewApiKey {
                    name: name.to_string(),
                    api_key: hash.to_string(),
                    enabled: true,
                    created_at: now_ms,
                    last_used_at: 0,
                    comment: comment.to_string(),
                })
                .returning(api_keys::id)
                .get_result::<i64>(conn)?;
            Ok(id)
        });

    match result {
        Ok(id) => Ok(id),
        Err(BootstrapTxError::Conflict) => {
            Err(AppError::code(ErrorCode::ApiKeyAlreadyInitialized))
        }
        Err(BootstrapTxError::Db(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::SerializationFailure,
            _,
        ))) => Err(AppError::code(ErrorCode::ApiKeyAlreadyInitialized)),
        Err(BootstrapTxError::Db(e)) => Err(e.into()),
    }
}

pub fn set_enabled(pool: &DbPool, id: i64, enabled: bool) -> AppResult<()> {
    let mut conn = get_conn(pool)?;
    let affected = diesel::update(api_keys::table.filter(api_keys::id.eq(id)))
        .set(api_keys::enabled.eq(enabled))
        .execute(&mut conn)?;
    if affected == 0 {
        return Err(AppError::not_found());
    }
    Ok(())
}

pub fn list(pool: &DbPool, page: i64, page_size: i64) -> AppResult<(Vec<ApiKey>, i64)> {
    let mut conn = get_conn(pool)?;
    let total: i64 = api_keys::table.count().get_result(&mut conn)?;
    let offset = (page.max(1) - 1) * page_size;
    let items = api_keys::table
        .order(api_keys::id.desc())
        .limit(page_size)
        .offset(offset)
        .load::<ApiKey>(&mut conn)?;
    Ok((items, total))
}

pub fn has_enabled_keys(pool: &DbPool) -> AppResult<bool> {
    let mut conn = get_conn(pool)?;
    let found = api_keys::table
        .filter(api_keys::enabled.eq(true))
        .select(api_keys::id)
        .first::<i64>(&mut conn)
        .optional()?;
    Ok(found.is_some())
}

pub fn touch_last_used(pool: &DbPool, id: i64, now_ms: i64) -> AppResult<()> {
    let mut conn = get_conn(pool)?;
    diesel::update(api_keys::table.filter(api_keys::id.eq(id)))
        .set(api_keys::last_used_at.eq(now_ms))
        .execute(&mut conn)?;
    Ok(())
}
