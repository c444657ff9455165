use std::sync::Arc;

use hickory_proto::op::{Message, ResponseCode};
use metrics::counter;

use crate::models::NewDnsRecord;
use crate::services::{record_service, token_service, webhook_service};
use crate::AppState;

use super::forwarder;

/// Token recorded when a captured query carries no usable label (the root
/// itself, or a capture-all query outside any monitored root).
pub const TOKEN_PLACEHOLDER: &str = "(none)";

/// Handle one raw DNS query: classify, persist, forward.
///
/// Returns the raw bytes to write back, or `None` when the packet should
/// be dropped (unparseable, or not exactly one question).
pub async fn handle_query(
    state: &Arc<AppState>,
    query: &[u8],
    client_ip: &str,
    protocol: &str,
) -> Option<Vec<u8>> {
    let request = Message::from_vec(query).ok()?;
    if request.queries().len() != 1 {
        return None;
    }
    let question = &request.queries()[0];
    let qname = normalize_domain(&question.name().to_utf8());
    let qtype = question.query_type().to_string();

    counter!("dnslog_dns_queries_total", &[("protocol", protocol.to_string())]).increment(1);

    let cfg = state.runtime.config();
    // Under capture-all every query is recorded with the placeholder
    // token; the matched root stays empty so the token lifecycle is
    // never driven.
    let matched_root = if cfg.capture_all {
        None
    } else {
        select_matched_root(&qname, &state.roots)
    };
    if cfg.capture_all || matched_root.is_some() {
        if allow_dns_query(state, client_ip).await {
            capture(state, &qname, matched_root.as_deref(), client_ip, protocol, &qtype).await;
        } else {
            tracing::debug!(client_ip = %client_ip, domain = %qname, "dns query over rate limit, not recorded");
        }
    }

    // The forward happens regardless of capture or rate-limit outcome.
    let upstream = state.runtime.current_upstream();
    let upstream_addr = format!("{upstream}:53");
    match forwarder::exchange(protocol, query, &upstream_addr).await {
        Ok(raw) => match Message::from_vec(&raw) {
            Ok(mut response) => {
                response.set_id(request.id());
                response.to_vec().ok()
            }
            Err(_) => Some(raw),
        },
        Err(e) => {
            tracing::warn!(error = %e, upstream = %upstream_addr, "upstream exchange failed");
            servfail(&request)
        }
    }
}

async fn capture(
    state: &Arc<AppState>,
    qname: &str,
    matched_root: Option<&str>,
    client_ip: &str,
    protocol: &str,
    qtype: &str,
) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let token = extract_token(qname, matched_root);
    let cfg = state.runtime.config();

    let record = NewDnsRecord {
        domain: qname.to_string(),
        client_ip: client_ip.to_string(),
        protocol: protocol.to_string(),
        qtype: qtype.to_string(),
        timestamp: now_ms,
        server: cfg.dns_listen_addr.clone(),
        token: token.clone(),
    };
    if let Err(e) = record_service::insert_record(&state.db, record) {
        tracing::error!(error = %e, domain = %qname, "failed to persist dns record");
    }

    tracing::info!(
        domain = %qname,
        token = %token,
        qtype = %qtype,
        client_ip = %client_ip,
        protocol = %protocol,
        "captured dns query"
    );

    // Only queries under a monitored root drive the token lifecycle.
    if matched_root.is_none() || token == TOKEN_PLACEHOLDER {
        return;
    }

    let ttl_ms = cfg.token_ttl_seconds * 1000;
    let is_first = match token_service::upsert_hit(&state.db, &token, qname, now_ms, ttl_ms) {
        Ok(is_first) => {
            counter!("dnslog_token_hits_total").increment(1);
            is_first
        }
        Err(e) => {
            // Upsert failure also suppresses the webhook for this query.
            tracing::error!(error = %e, token = %token, "token hit upsert failed");
            return;
        }
    };

    if let Err(e) = webhook_service::maybe_enqueue(
        &state.db,
        state.redis.as_ref(),
        cfg,
        &token,
        qname,
        is_first,
    )
    .await
    {
        tracing::error!(error = %e, token = %token, "webhook enqueue failed");
    }
}

/// DNS-path rate limit. Fails open: a cache outage must not starve the
/// capture path.
async fn allow_dns_query(state: &Arc<AppState>, client_ip: &str) -> bool {
    let cfg = state.runtime.config();
    if !cfg.dns_rate_limit_enabled {
        return true;
    }
    let Some(redis) = state.redis.as_ref() else {
        return true;
    };
    let key = format!("dns_rl:{client_ip}");
    redis
        .rate_limit_check(&key, cfg.dns_rate_limit_max_requests, cfg.dns_rate_limit_window_seconds)
        .await
        .unwrap_or(true)
}

fn servfail(request: &Message) -> Option<Vec<u8>> {
    let response = Message::error_msg(request.id(), request.op_code(), ResponseCode::ServFail);
    response.to_vec().ok()
}

/// Lowercase, trimmed, no trailing dot.
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_lowercase()
}

/// Structural domain validation for operator-submitted names: overall
/// length 3..=253, at least two labels, each label 1..=63 of
/// alphanumerics and inner hyphens, alphabetic TLD of 2+ chars.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.len() < 3 || domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }
    let tld = labels[labels.len() - 1];
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// First monitored root the name falls under, if any.
pub fn select_matched_root(qname: &str, roots: &[String]) -> Option<String> {
    for root in roots {
        if qname == root || qname.ends_with(&format!(".{root}")) {
            return Some(root.clone());
        }
    }
    None
}

/// First label of the subdomain under the matched root, or the
/// placeholder when there is nothing to extract.
pub fn extract_token(qname: &str, matched_root: Option<&str>) -> String {
    let Some(root) = matched_root else {
        return TOKEN_PLACEHOLDER.to_string();
    };
    let Some(subdomain) = qname.strip_suffix(&format!(".{root}")) else {
        return TOKEN_PLACEHOLDER.to_string();
    };
    subdomain
        .split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| TOKEN_PLACEHOLDER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> Vec<String> {
        vec!["demo.com".to_string(), "oob.example".to_string()]
    }

    #[test]
    fn normalize_strips_dot_and_case() {
        assert_eq!(normalize_domain("ABC1234567.Demo.COM."), "abc1234567.demo.com");
        assert_eq!(normalize_domain("  demo.com  "), "demo.com");
    }

    #[test]
    fn matched_root_selection() {
        assert_eq!(
            select_matched_root("abc1234567.demo.com", &roots()).as_deref(),
            Some("demo.com")
        );
        assert_eq!(
            select_matched_root("demo.com", &roots()).as_deref(),
            Some("demo.com")
        );
        assert_eq!(
            select_matched_root("x.y.oob.example", &roots()).as_deref(),
            Some("oob.example")
        );
        assert_eq!(select_matched_root("notdemo.com", &roots()), None);
        assert_eq!(select_matched_root("example.org", &roots()), None);
    }

    #[test]
    fn domain_validation() {
        assert!(is_valid_domain("abc1234567.demo.com"));
        assert!(is_valid_domain("a-b.demo.com"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("nodots"));
        assert!(!is_valid_domain("double..dot.com"));
        assert!(!is_valid_domain("-lead.demo.com"));
        assert!(!is_valid_domain("trail-.demo.com"));
        assert!(!is_valid_domain("demo.c0m1"));
        assert!(!is_valid_domain(&format!("{}.com", "a".repeat(64))));
        assert!(!is_valid_domain(&format!("{}.com", "a.".repeat(130))));
    }

    #[test]
    fn token_extraction() {
        assert_eq!(
            extract_token("abc1234567.demo.com", Some("demo.com")),
            "abc1234567"
        );
        assert_eq!(
            extract_token("deep.abc1234567.demo.com", Some("demo.com")),
            "deep"
        );
        assert_eq!(extract_token("demo.com", Some("demo.com")), TOKEN_PLACEHOLDER);
        assert_eq!(extract_token("whatever.org", None), TOKEN_PLACEHOLDER);
    }
}
