use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub edhrec_base_url: String,
    /// Cron expression for the periodic discovery run.
    pub discovery_cron: String,
    /// Outbound request budget per source window.
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    /// Spacing between consecutive detail jobs.
    pub detail_stagger: Duration,
    /// Detail worker poll interval.
    pub worker_poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            edhrec_base_url: env::var("EDHREC_BASE_URL")
                .unwrap_or_else(|_| "https://edhrec.com".to_string()),
            // Weekly, Monday 03:00 UTC
            discovery_cron: env::var("DISCOVERY_CRON")
                .unwrap_or_else(|_| "0 0 3 * * MON".to_string()),
            rate_limit_max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("RATE_LIMIT_MAX_REQUESTS must be a valid number")?,
            rate_limit_window: Duration::from_secs(
                env::var("RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("RATE_LIMIT_WINDOW_SECS must be a valid number")?,
            ),
            detail_stagger: Duration::from_secs(
                env::var("DETAIL_STAGGER_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .context("DETAIL_STAGGER_SECS must be a valid number")?,
            ),
            worker_poll_interval: Duration::from_secs(
                env::var("WORKER_POLL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("WORKER_POLL_SECS must be a valid number")?,
            ),
        })
    }
}
