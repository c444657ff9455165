use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

use crate::errors::{AppError, AppResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

/// Caps any single statement server-side so a stuck query cannot hold a
/// worker past its deadline.
#[derive(Debug)]
struct StatementTimeout;

impl diesel::r2d2::CustomizeConnection<PgConnection, diesel::r2d2::Error> for StatementTimeout {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("SET statement_timeout = 5000")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(StatementTimeout))
        .test_on_check_out(true)
        .build(manager)?;

    tracing::info!("database connection pool created");
    Ok(pool)
}

pub fn get_conn(pool: &DbPool) -> AppResult<DbConn> {
    pool.get().map_err(|e| {
        tracing::error!(error = %e, "failed to get db connection");
        AppError::internal()
    })
}

/// Idempotent schema bootstrap. Indices cover the dominant list
/// predicates and the sweep scans.
pub fn init_schema(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    conn.batch_execute(
        r#"
CREATE TABLE IF NOT EXISTS dns_records (
    id BIGSERIAL PRIMARY KEY,
    domain TEXT NOT NULL,
    client_ip TEXT NOT NULL,
    protocol TEXT NOT NULL,
    qtype TEXT NOT NULL,
    timestamp BIGINT NOT NULL,
    server TEXT NOT NULL DEFAULT '',
    token TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_dns_records_token_ts ON dns_records (token, timestamp);
CREATE INDEX IF NOT EXISTS idx_dns_records_qtype_ts ON dns_records (qtype, timestamp);
CREATE INDEX IF NOT EXISTS idx_dns_records_client_ts ON dns_records (client_ip, timestamp);
CREATE INDEX IF NOT EXISTS idx_dns_records_proto_ts ON dns_records (protocol, timestamp);

CREATE TABLE IF NOT EXISTS dns_tokens (
    token VARCHAR(128) PRIMARY KEY,
    domain TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    hit_count BIGINT NOT NULL DEFAULT 0,
    first_seen BIGINT NOT NULL DEFAULT 0,
    last_seen BIGINT NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    expires_at BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_dns_tokens_status_exp ON dns_tokens (status, expires_at);

CREATE TABLE IF NOT EXISTS api_keys (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    api_key VARCHAR(64) NOT NULL UNIQUE,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at BIGINT NOT NULL,
    last_used_at BIGINT NOT NULL DEFAULT 0,
    comment TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS audit_logs (
    id BIGSERIAL PRIMARY KEY,
    trace_id TEXT NOT NULL DEFAULT '',
    api_key_id BIGINT,
    path TEXT NOT NULL DEFAULT '',
    method TEXT NOT NULL DEFAULT '',
    client_ip TEXT NOT NULL DEFAULT '',
    status_code INTEGER NOT NULL DEFAULT 0,
    latency_ms BIGINT NOT NULL DEFAULT 0,
    token TEXT NOT NULL DEFAULT '',
    created_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS ip_blacklist (
    id BIGSERIAL PRIMARY KEY,
    ip TEXT NOT NULL UNIQUE,
    reason TEXT NOT NULL DEFAULT '',
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS token_webhooks (
    id BIGSERIAL PRIMARY KEY,
    token VARCHAR(128) NOT NULL UNIQUE,
    webhook_url TEXT NOT NULL,
    secret TEXT NOT NULL DEFAULT '',
    mode TEXT NOT NULL DEFAULT 'FIRST_HIT',
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_jobs (
    id BIGSERIAL PRIMARY KEY,
    token TEXT NOT NULL,
    url TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '',
    secret TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'PENDING',
    retry_count INTEGER NOT NULL DEFAULT 0,
    next_retry_at BIGINT NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_webhook_jobs_status_retry ON webhook_jobs (status, next_retry_at);
"#,
    )?;

    tracing::info!("database schema initialized");
    Ok(())
}

/// True when the error is a unique-constraint violation; callers use this
/// to tell duplicate keys apart from real failures.
pub fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        )
    )
}
