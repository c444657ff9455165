use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::clients::db::{get_conn, DbPool};
use crate::errors::AppResult;
use crate::models::{DnsRecord, NewDnsRecord};
use crate::schema::dns_records;

/// Filters for record listing. `cursor` is a keyset bound on `timestamp`
/// (`< cursor` descending, `> cursor` ascending); when set, the offset is
/// forced to zero.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub page: i64,
    pub page_size: i64,
    pub domain: Option<String>,
    pub client_ip: Option<String>,
    pub protocol: Option<String>,
    pub qtype: Option<String>,
    pub token: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub cursor: Option<i64>,
    pub ascending: bool,
}

fn filtered(filter: &RecordFilter) -> dns_records::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = dns_records::table.into_boxed();
    if let Some(domain) = &filter.domain {
        query = query.filter(dns_records::domain.eq(domain.clone()));
    }
    if let Some(client_ip) = &filter.client_ip {
        query = query.filter(dns_records::client_ip.eq(client_ip.clone()));
    }
    if let Some(protocol) = &filter.protocol {
        query = query.filter(dns_records::protocol.eq(protocol.clone()));
    }
    if let Some(qtype) = &filter.qtype {
        query = query.filter(dns_records::qtype.eq(qtype.clone()));
    }
    if let Some(token) = &filter.token {
        query = query.filter(dns_records::token.eq(token.clone()));
    }
    if let Some(start) = filter.start {
        query = query.filter(dns_records::timestamp.ge(start));
    }
    if let Some(end) = filter.end {
        query = query.filter(dns_records::timestamp.le(end));
    }
    query
}

pub fn insert_record(pool: &DbPool, record: NewDnsRecord) -> AppResult<()> {
    let mut conn = get_conn(pool)?;
    diesel::insert_into(dns_records::table)
        .values(&record)
        .execute(&mut conn)?;
    Ok(())
}

pub fn list_records(pool: &DbPool, filter: &RecordFilter) -> AppResult<(Vec<DnsRecord>, i64)> {
    let mut conn = get_conn(pool)?;

    let total: i64 = filtered(filter).count().get_result(&mut conn)?;

    let mut query = filtered(filter);
    let mut offset = (filter.page.max(1) - 1) * filter.page_size;
    if let Some(cursor) = filter.cursor {
        query = if filter.ascending {
            query.filter(dns_records::timestamp.gt(cursor))
        } else {
            query.filter(dns_records::timestamp.lt(cursor))
        };
        offset = 0;
    }
    query = if filter.ascending {
        query.order(dns_records::timestamp.asc())
    } else {
        query.order(dns_records::timestamp.desc())
    };

    let items = query
        .limit(filter.page_size)
        .offset(offset)
        .load::<DnsRecord>(&mut conn)?;

    Ok((items, total))
}

/// Retention cleanup: drop records older than `cutoff_ms`, at most
/// `limit` per call so a large backlog cannot hold locks for long.
pub fn delete_old_records(pool: &DbPool, cutoff_ms: i64, limit: i64) -> AppResult<usize> {
    let mut conn = get_conn(pool)?;
    let limit = if limit <= 0 { 1000 } else { limit };
    let affected = diesel::sql_query(
        r#"
DELETE FROM dns_records
WHERE id IN (
    SELECT id FROM dns_records
    WHERE timestamp < $1
    ORDER BY timestamp ASC
    LIMIT $2
)
"#,
    )
    .bind::<BigInt, _>(cutoff_ms)
    .bind::<BigInt, _>(limit)
    .execute(&mut conn)?;
    Ok(affected)
}
