use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{api_keys, audit_logs, dns_records, dns_tokens, ip_blacklist, token_webhooks, webhook_jobs};

pub const TOKEN_STATUS_INIT: &str = "INIT";
pub const TOKEN_STATUS_HIT: &str = "HIT";
pub const TOKEN_STATUS_EXPIRED: &str = "EXPIRED";

pub const JOB_STATUS_PENDING: &str = "PENDING";
pub const JOB_STATUS_SUCCESS: &str = "SUCCESS";
pub const JOB_STATUS_FAILED: &str = "FAILED";

pub const WEBHOOK_MODE_FIRST_HIT: &str = "FIRST_HIT";
pub const WEBHOOK_MODE_EACH_HIT: &str = "EACH_HIT";

/// One captured DNS observation. Immutable after insert.
#[derive(Debug, Queryable, Serialize)]
#[diesel(table_name = dns_records)]
pub struct DnsRecord {
    pub id: i64,
    pub domain: String,
    pub client_ip: String,
    pub protocol: String,
    pub qtype: String,
    pub timestamp: i64,
    pub server: String,
    pub token: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dns_records)]
pub struct NewDnsRecord {
    pub domain: String,
    pub client_ip: String,
    pub protocol: String,
    pub qtype: String,
    pub timestamp: i64,
    pub server: String,
    pub token: String,
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = dns_tokens)]
pub struct TokenStatus {
    pub token: String,
    pub domain: String,
    pub status: String,
    pub hit_count: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dns_tokens)]
pub struct NewToken {
    pub token: String,
    pub domain: String,
    pub status: String,
    pub hit_count: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Queryable, Serialize)]
#[diesel(table_name = api_keys)]
pub struct ApiKey {
    pub id: i64,
    pub name: String,
    /// hex(SHA-256(plaintext)); the plaintext is never stored.
    pub api_key: String,
    pub enabled: bool,
    pub created_at: i64,
    pub last_used_at: i64,
    pub comment: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_keys)]
pub struct NewApiKey {
    pub name: String,
    pub api_key: String,
    pub enabled: bool,
    pub created_at: i64,
    pub last_used_at: i64,
    pub comment: String,
}

/// Audit entries travel through the redis queue as JSON before they land
/// in the table, so this one derives both directions.
#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = audit_logs)]
pub struct AuditEntry {
    pub trace_id: String,
    pub api_key_id: Option<i64>,
    pub path: String,
    pub method: String,
    pub client_ip: String,
    pub status_code: i32,
    pub latency_ms: i64,
    pub token: String,
    pub created_at: i64,
}

#[derive(Debug, Queryable, Serialize)]
#[diesel(table_name = ip_blacklist)]
pub struct BlacklistEntry {
    pub id: i64,
    pub ip: String,
    pub reason: String,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ip_blacklist)]
pub struct NewBlacklistEntry {
    pub ip: String,
    pub reason: String,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = token_webhooks)]
pub struct TokenWebhook {
    pub id: i64,
    pub token: String,
    pub webhook_url: String,
    /// Either empty or an `enc:`-prefixed blob; see [`crate::crypto`].
    pub secret: String,
    pub mode: String,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = token_webhooks)]
pub struct NewTokenWebhook {
    pub token: String,
    pub webhook_url: String,
    pub secret: String,
    pub mode: String,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = webhook_jobs)]
pub struct WebhookJob {
    pub id: i64,
    pub token: String,
    pub url: String,
    pub payload: String,
    pub secret: String,
    pub status: String,
    pub retry_count: i32,
    pub next_retry_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = webhook_jobs)]
pub struct NewWebhookJob {
    pub token: String,
    pub url: String,
    pub payload: String,
    pub secret: String,
    pub status: String,
    pub retry_count: i32,
    pub next_retry_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
