diesel::table! {
    dns_records (id) {
        id -> Int8,
        domain -> Text,
        client_ip -> Text,
        protocol -> Text,
        qtype -> Text,
        timestamp -> Int8,
        server -> Text,
        token -> Text,
    }
}

diesel::table! {
    dns_tokens (token) {
        #[max_length = 128]
        token -> Varchar,
        domain -> Text,
        status -> Text,
        hit_count -> Int8,
        first_seen -> Int8,
        last_seen -> Int8,
        created_at -> Int8,
        updated_at -> Int8,
        expires_at -> Int8,
    }
}

diesel::table! {
    api_keys (id) {
        id -> Int8,
        name -> Text,
        #[max_length = 64]
        api_key -> Varchar,
        enabled -> Bool,
        created_at -> Int8,
        last_used_at -> Int8,
        comment -> Text,
    }
}

diesel::table! {
    audit_logs (id) {
        id -> Int8,
        trace_id -> Text,
        api_key_id -> Nullable<Int8>,
        path -> Text,
        method -> Text,
        client_ip -> Text,
        status_code -> Int4,
        latency_ms -> Int8,
        token -> Text,
        created_at -> Int8,
    }
}

diesel::table! {
    ip_blacklist (id) {
        id -> Int8,
        ip -> Text,
        reason -> Text,
        enabled -> Bool,
        created_at -> Int8,
    }
}

diesel::table! {
    token_webhooks (id) {
        id -> Int8,
        #[max_length = 128]
        token -> Varchar,
        webhook_url -> Text,
        secret -> Text,
        mode -> Text,
        enabled -> Bool,
        created_at -> Int8,
    }
}

diesel::table! {
    webhook_jobs (id) {
        id -> Int8,
        token -> Text,
        url -> Text,
        payload -> Text,
        secret -> Text,
        status -> Text,
        retry_count -> Int4,
        next_retry_at -> Int8,
        created_at -> Int8,
        updated_at -> Int8,
    }
}
