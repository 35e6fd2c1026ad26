use actix_web::{dev::Service, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaderboard_service::audit::{AuditSink, PgAuditSink, TracingAuditSink};
use leaderboard_service::cache::{FreshnessCache, MemoryCache, PgCache, RedisCache};
use leaderboard_service::config::{CacheBackend, Config};
use leaderboard_service::handlers::{get_leaderboard, get_user, LeaderboardState};
use leaderboard_service::jobs::cache_warmer::{start_cache_warmer, CacheWarmerConfig};
use leaderboard_service::services::{HttpProfileClient, RefreshOrchestrator};

/// Build the cache backend and audit sink named by the configuration.
async fn build_storage(
    config: &Config,
) -> anyhow::Result<(Arc<dyn FreshnessCache>, Arc<dyn AuditSink>)> {
    let pool = match &config.storage.database_url {
        Some(url) => Some(
            PgPoolOptions::new()
                .max_connections(config.storage.max_connections)
                .connect(url)
                .await
                .context("failed to connect to PostgreSQL")?,
        ),
        None => None,
    };

    let cache: Arc<dyn FreshnessCache> = match config.storage.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Redis => {
            let url = config
                .storage
                .redis_url
                .as_deref()
                .context("REDIS_URL is not set")?;
            Arc::new(
                RedisCache::new(url)
                    .await
                    .context("failed to connect to Redis")?,
            )
        }
        CacheBackend::Postgres => {
            let pool = pool.clone().context("DATABASE_URL is not set")?;
            let cache = PgCache::new(pool);
            cache
                .ensure_schema()
                .await
                .context("failed to prepare leaderboard_users table")?;
            Arc::new(cache)
        }
    };

    let audit: Arc<dyn AuditSink> = match pool {
        Some(pool) => {
            let sink = PgAuditSink::new(pool);
            sink.ensure_schema().await?;
            Arc::new(sink)
        }
        None => Arc::new(TracingAuditSink),
    };

    Ok((cache, audit))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting leaderboard-service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        env = %config.app.env,
        roster = config.roster.len(),
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    let (cache, audit) = match build_storage(&config).await {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!("Storage initialization failed: {:#}", e);
            eprintln!("ERROR: Failed to initialize storage: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(backend = cache.backend_name(), "Freshness cache ready");

    let fetcher = match HttpProfileClient::new(&config.upstream) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Upstream client initialization failed: {}", e);
            eprintln!("ERROR: Failed to build upstream client: {}", e);
            std::process::exit(1);
        }
    };

    let orchestrator = Arc::new(RefreshOrchestrator::new(
        cache,
        fetcher,
        audit,
        config.roster.clone(),
        config.refresh.clone(),
    ));

    let warmer_config = CacheWarmerConfig::from(&config.warmer);
    if warmer_config.enabled {
        let warmer_orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            start_cache_warmer(warmer_orchestrator, warmer_config).await;
        });
        info!("✅ Cache warmer background job started");
    } else {
        info!("Cache warmer disabled by configuration");
    }

    let state = web::Data::new(LeaderboardState { orchestrator });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/api/v1/health/live", web::get().to(|| async { "OK" }))
            .route("/api/v1/health/ready", web::get().to(|| async { "OK" }))
            .route(
                "/metrics",
                web::get().to(leaderboard_service::metrics::serve_metrics),
            )
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            leaderboard_service::metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            leaderboard_service::metrics::observe_http_request(
                                &method,
                                &path,
                                500,
                                start.elapsed(),
                            );
                            Err(err)
                        }
                    }
                }
            })
            .service(get_leaderboard)
            .service(get_user)
    })
    .bind(format!("0.0.0.0:{}", config.app.port))?
    .run()
    .await
}
