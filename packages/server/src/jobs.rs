//! PostgreSQL-backed scheduling primitive.
//!
//! Stores serialized commands as rows in `scraper_jobs`; the detail
//! worker claims due rows and executes them. This is intentionally a
//! thin primitive for one command family, not a generic queue engine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use edhrec_scraper::{JobQueue, ScraperCommand};

/// Default retry budget for a scheduled job.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn schedule(&self, command: ScraperCommand, run_at: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let job_type = command.command_type();
        let args = serde_json::to_value(&command).context("Failed to serialize command")?;

        sqlx::query(
            r#"
            INSERT INTO scraper_jobs (
                id, job_type, args, status, run_at, retry_count, max_retries,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, 'pending', $4, 0, $5, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(job_type)
        .bind(&args)
        .bind(run_at)
        .bind(DEFAULT_MAX_RETRIES)
        .execute(&self.pool)
        .await
        .context("Failed to enqueue job")?;

        debug!(job_id = %id, job_type, %run_at, "job scheduled");
        Ok(id)
    }
}
