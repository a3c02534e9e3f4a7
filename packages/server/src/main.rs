// Main entry point for the deckbox scraper server

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edhrec_scraper::{
    DetailJob, EdhrecClient, PostgresScraperStorage, RateLimitConfig, ScryfallCardResolver,
    SourceRateLimiter,
};
use server_core::{build_app, Config, DetailWorker, PostgresJobQueue, PostgresJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,edhrec_scraper=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting deckbox scraper server");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let rate_limiter = Arc::new(SourceRateLimiter::new(RateLimitConfig {
        max_requests: config.rate_limit_max_requests,
        window: config.rate_limit_window,
    }));
    let client = Arc::new(
        EdhrecClient::new(&config.edhrec_base_url, rate_limiter)
            .context("Failed to create EDHREC client")?,
    );
    let resolver = Arc::new(ScryfallCardResolver::new().context("Failed to create card resolver")?);
    let storage = Arc::new(PostgresScraperStorage::new(pool.clone()));
    let queue = Arc::new(PostgresJobQueue::new(pool.clone()));

    // Background detail worker
    let detail = DetailJob::new(storage.clone(), client.clone(), resolver);
    let worker = DetailWorker::new(
        PostgresJobStore::new(pool.clone()),
        detail,
        config.worker_poll_interval,
    );
    tokio::spawn(worker.run());

    // Periodic discovery
    let _scheduler = server_core::scheduled_tasks::start_scheduler(
        &config.discovery_cron,
        storage.clone(),
        client,
        queue,
        config.detail_stagger,
    )
    .await
    .context("Failed to start scheduler")?;

    let app = build_app(storage);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
