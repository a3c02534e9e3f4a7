//! PostgreSQL-backed scraper storage.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::traits::ScraperStorage;
use crate::types::{
    Commander, DeckEntry, ExecutionFilter, ExecutionOutcome, ExecutionRecord, ExecutionStats,
    ExecutionStatus, RankedCommander,
};

pub struct PostgresScraperStorage {
    pool: PgPool,
}

impl PostgresScraperStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn commander_from_row(row: &PgRow) -> Commander {
    Commander {
        id: row.get("id"),
        name: row.get("name"),
        rank: row.get("rank"),
        source_url: row.get("source_url"),
        last_scraped_at: row.get("last_scraped_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn execution_from_row(row: &PgRow) -> Result<ExecutionRecord> {
    let status: String = row.get("status");
    let status = ExecutionStatus::parse(&status)
        .with_context(|| format!("unknown execution status '{status}'"))?;
    Ok(ExecutionRecord {
        id: row.get("id"),
        status,
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        commanders_attempted: row.get("commanders_attempted"),
        commanders_succeeded: row.get("commanders_succeeded"),
        commanders_failed: row.get("commanders_failed"),
        error_summary: row.get("error_summary"),
    })
}

#[async_trait]
impl ScraperStorage for PostgresScraperStorage {
    async fn upsert_commander(&self, commander: &RankedCommander) -> Result<Uuid> {
        // Rank is the only field an existing row takes from discovery;
        // last_scraped_at in particular is never touched here.
        let row = sqlx::query(
            r#"
            INSERT INTO commanders (id, name, rank, source_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (name) DO UPDATE
                SET rank = EXCLUDED.rank,
                    updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&commander.name)
        .bind(commander.rank)
        .bind(&commander.url)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert commander")?;

        Ok(row.get("id"))
    }

    async fn get_commander(&self, id: Uuid) -> Result<Option<Commander>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, rank, source_url, last_scraped_at, created_at, updated_at
            FROM commanders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get commander")?;

        Ok(row.map(|r| commander_from_row(&r)))
    }

    async fn get_commander_by_name(&self, name: &str) -> Result<Option<Commander>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, rank, source_url, last_scraped_at, created_at, updated_at
            FROM commanders
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get commander by name")?;

        Ok(row.map(|r| commander_from_row(&r)))
    }

    async fn replace_decklist(
        &self,
        commander_id: Uuid,
        entries: &[DeckEntry],
        scraped_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin decklist transaction")?;

        sqlx::query("DELETE FROM decklist_cards WHERE commander_id = $1")
            .bind(commander_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear prior decklist")?;

        for (position, entry) in entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO decklist_cards (
                    id, commander_id, position, card_name, category, is_commander, external_card_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(commander_id)
            .bind(position as i32)
            .bind(&entry.card_name)
            .bind(&entry.category)
            .bind(entry.is_commander)
            .bind(&entry.external_card_id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert decklist card")?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE commanders
            SET last_scraped_at = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(scraped_at)
        .bind(commander_id)
        .execute(&mut *tx)
        .await
        .context("Failed to stamp commander as scraped")?;

        if updated.rows_affected() == 0 {
            bail!("commander {commander_id} not found");
        }

        tx.commit()
            .await
            .context("Failed to commit decklist transaction")?;
        Ok(())
    }

    async fn get_decklist(&self, commander_id: Uuid) -> Result<Option<Vec<DeckEntry>>> {
        let rows = sqlx::query(
            r#"
            SELECT card_name, category, is_commander, external_card_id
            FROM decklist_cards
            WHERE commander_id = $1
            ORDER BY position
            "#,
        )
        .bind(commander_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get decklist")?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            rows.into_iter()
                .map(|r| DeckEntry {
                    card_name: r.get("card_name"),
                    category: r.get("category"),
                    is_commander: r.get("is_commander"),
                    external_card_id: r.get("external_card_id"),
                })
                .collect(),
        ))
    }

    async fn create_execution(&self, started_at: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO scraper_executions (id, status, started_at)
            VALUES ($1, 'pending', $2)
            "#,
        )
        .bind(id)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .context("Failed to create execution record")?;
        Ok(id)
    }

    async fn finalize_execution(&self, id: Uuid, outcome: &ExecutionOutcome) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scraper_executions
            SET status = $1,
                finished_at = $2,
                commanders_attempted = $3,
                commanders_succeeded = $4,
                commanders_failed = $5,
                error_summary = $6
            WHERE id = $7
            "#,
        )
        .bind(outcome.status.as_str())
        .bind(outcome.finished_at)
        .bind(outcome.commanders_attempted)
        .bind(outcome.commanders_succeeded)
        .bind(outcome.commanders_failed)
        .bind(&outcome.error_summary)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to finalize execution record")?;

        if result.rows_affected() == 0 {
            bail!("execution {id} not found");
        }
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, started_at, finished_at,
                   commanders_attempted, commanders_succeeded, commanders_failed,
                   error_summary
            FROM scraper_executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get execution record")?;

        row.map(|r| execution_from_row(&r)).transpose()
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, started_at, finished_at,
                   commanders_attempted, commanders_succeeded, commanders_failed,
                   error_summary
            FROM scraper_executions
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR started_at >= $2)
            ORDER BY started_at DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.started_after)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list execution records")?;

        rows.iter().map(execution_from_row).collect()
    }

    async fn execution_stats(&self) -> Result<ExecutionStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'success') AS successful,
                   COUNT(*) FILTER (WHERE status = 'failure') AS failed,
                   COUNT(*) FILTER (WHERE status = 'partial_success') AS partial
            FROM scraper_executions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute execution stats")?;

        Ok(ExecutionStats::from_counts(
            row.get("total"),
            row.get("successful"),
            row.get("failed"),
            row.get("partial"),
        ))
    }
}
