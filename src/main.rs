use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod clients;
mod config;
mod crypto;
mod dns;
mod errors;
mod middleware;
mod models;
mod routes;
mod schema;
mod services;
mod types;
mod workers;

use clients::db::DbPool;
use clients::redis::RedisClient;
use config::{AppConfig, Runtime};

pub struct AppState {
    pub db: DbPool,
    pub redis: Option<RedisClient>,
    pub runtime: Arc<Runtime>,
    /// Monitored roots, precomputed at startup (lowercased, deduped).
    pub roots: Vec<String>,
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    middleware::init_tracing("dnslog");

    let cfg = AppConfig::load()?;

    let db = clients::db::create_pool(&cfg.database_url)?;
    clients::db::init_schema(&db)?;

    let redis = match RedisClient::connect(&cfg.redis_url).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "redis unavailable, running without cache/queue");
            None
        }
    };

    let metrics = cfg.metrics_enabled.then(middleware::init_metrics);

    if cfg.webhook_enabled && !cfg.webhook_secret_key.is_empty() {
        match services::webhook_service::reencrypt_legacy_secrets(&db, &cfg) {
            Ok(0) => {}
            Ok(migrated) => tracing::info!(migrated, "legacy webhook secrets re-encrypted"),
            Err(e) => tracing::warn!(error = %e, "legacy secret migration failed"),
        }
    }

    let roots = cfg.roots();
    let runtime = Arc::new(Runtime::new(cfg.clone()));
    let state = Arc::new(AppState {
        db,
        redis,
        runtime,
        roots,
        metrics,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // DNS capture server.
    {
        let dns_state = state.clone();
        let dns_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = dns::run(dns_state, dns_shutdown).await {
                tracing::error!(error = %e, "dns capture server failed");
            }
        });
    }

    // Background workers, each under a restart-on-panic supervisor.
    if cfg.webhook_enabled {
        let s = state.clone();
        let rx = shutdown_rx.clone();
        workers::spawn_supervised("webhook-worker", move || {
            workers::run_webhook_worker(s.clone(), rx.clone())
        });
        let s = state.clone();
        let rx = shutdown_rx.clone();
        workers::spawn_supervised("webhook-sweeper", move || {
            workers::run_webhook_sweeper(s.clone(), rx.clone())
        });
    }
    {
        let s = state.clone();
        let rx = shutdown_rx.clone();
        workers::spawn_supervised("token-expiry", move || {
            workers::run_expire_worker(s.clone(), rx.clone())
        });
    }
    if cfg.audit_enabled {
        let s = state.clone();
        let rx = shutdown_rx.clone();
        workers::spawn_supervised("audit-drain", move || {
            workers::run_audit_worker(s.clone(), rx.clone())
        });
    }
    if cfg.retention_enabled {
        let s = state.clone();
        let rx = shutdown_rx.clone();
        workers::spawn_supervised("retention", move || {
            workers::run_retention_worker(s.clone(), rx.clone())
        });
    }

    // Control-plane router: every path is exposed at both / and /api/.
    // Admission order (outermost first): trace, audit, blacklist, auth,
    // rate limit, metrics.
    let api = api_router();
    let app = Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(from_fn(middleware::metrics_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::http_rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::api_key_auth))
        .layer(from_fn_with_state(state.clone(), middleware::ip_blacklist))
        .layer(from_fn_with_state(state.clone(), middleware::audit_middleware))
        .layer(from_fn(middleware::trace_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = signal_tx.send(true);
    });

    let http_addr = dns::normalize_listen_addr(&cfg.http_listen_addr);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!(addr = %http_addr, "http control plane listening");

    let mut graceful_rx = shutdown_rx.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = graceful_rx.changed().await;
    });

    // DNS listeners drop out as soon as the signal fires; HTTP gets a
    // bounded drain before the process exits.
    let mut grace_rx = shutdown_rx;
    tokio::select! {
        result = server => result?,
        _ = async {
            let _ = grace_rx.changed().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        } => {
            tracing::warn!("shutdown grace period expired, exiting");
        }
    }

    tracing::info!("dnslog stopped");
    Ok(())
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/submit", post(routes::records::submit_domain))
        .route("/random-domain", get(routes::tokens::allocate_token))
        .route("/records", get(routes::records::list_records))
        .route(
            "/tokens",
            post(routes::tokens::allocate_token).get(routes::tokens::list_tokens),
        )
        .route("/tokens/:token", get(routes::tokens::get_token_status))
        .route("/tokens/:token/records", get(routes::tokens::token_records))
        .route(
            "/tokens/:token/webhook",
            post(routes::webhooks::bind_webhook)
                .get(routes::webhooks::get_webhook)
                .delete(routes::webhooks::disable_webhook),
        )
        .route(
            "/tokens/:token/webhook/disable",
            post(routes::webhooks::disable_webhook),
        )
        .route(
            "/keys",
            post(routes::keys::create_key).get(routes::keys::list_keys),
        )
        .route("/keys/bootstrap", post(routes::keys::create_key_bootstrap))
        .route("/keys/:id/disable", post(routes::keys::disable_key))
        .route("/keys/:id", delete(routes::keys::disable_key))
        .route(
            "/blacklist",
            post(routes::blacklist::add_blacklist).get(routes::blacklist::list_blacklist),
        )
        .route(
            "/blacklist/:id/disable",
            post(routes::blacklist::disable_blacklist),
        )
        .route("/blacklist/:id", delete(routes::blacklist::disable_blacklist))
        .route("/config", get(routes::system::get_config))
        .route("/metrics", get(routes::system::get_metrics))
        .route("/pause", post(routes::system::pause))
        .route("/start", post(routes::system::start))
        .route("/change", post(routes::system::change_upstream))
        .route("/change-pact", post(routes::system::change_protocol))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
