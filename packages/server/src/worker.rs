//! Detail worker: claims due `scraper_jobs` rows and runs the detail
//! scrape for each.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED`, so several worker processes
//! can poll the same table without dispatching a job twice. A claim also
//! sweeps up 'running' rows whose claim has gone stale, so a worker that
//! died mid-job cannot strand work forever. Failures re-queue the job
//! with exponential backoff until its retry budget is spent, then
//! dead-letter it. Bookkeeping failures on one job are logged and never
//! abandon the rest of the claimed batch.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use edhrec_scraper::{
    CardResolver, CommanderSource, DetailJob, ScraperCommand, ScraperStorage,
};

const CLAIM_BATCH: i64 = 10;

/// A 'running' row untouched for this long is considered orphaned and
/// becomes claimable again. Must comfortably exceed the longest detail
/// scrape; re-execution after it is at-least-once, not a bug.
pub(crate) const CLAIM_TIMEOUT: Duration = Duration::from_secs(600);

/// Backoff before the n-th retry, capped at one hour.
fn retry_delay_secs(retry_count: i32) -> i64 {
    2i64.pow(retry_count.max(0) as u32).min(3600)
}

/// One claimed job row, ready to execute.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub args: serde_json::Value,
    pub retry_count: i32,
    pub max_retries: i32,
}

/// Persistence seam for the worker's claim/ack lifecycle.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim up to `batch` jobs: due 'pending' rows plus 'running' rows
    /// whose claim is older than [`CLAIM_TIMEOUT`]. Claimed rows are
    /// moved to 'running' atomically.
    async fn claim_due(&self, batch: i64) -> Result<Vec<ClaimedJob>>;

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Put the job back in 'pending' to run at `retry_at`.
    async fn requeue(&self, job_id: Uuid, retry_at: DateTime<Utc>, error: &str) -> Result<()>;

    async fn dead_letter(&self, job_id: Uuid, error: &str) -> Result<()>;
}

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn claim_due(&self, batch: i64) -> Result<Vec<ClaimedJob>> {
        let rows = sqlx::query(
            r#"
            UPDATE scraper_jobs
            SET status = 'running', updated_at = NOW()
            WHERE id IN (
                SELECT id FROM scraper_jobs
                WHERE (status = 'pending' AND run_at <= NOW())
                   OR (status = 'running' AND updated_at < NOW() - make_interval(secs => $2))
                ORDER BY run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, args, retry_count, max_retries
            "#,
        )
        .bind(batch)
        .bind(CLAIM_TIMEOUT.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .context("Failed to claim due jobs")?;

        Ok(rows
            .into_iter()
            .map(|row| ClaimedJob {
                id: row.get("id"),
                args: row.get("args"),
                retry_count: row.get("retry_count"),
                max_retries: row.get("max_retries"),
            })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE scraper_jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark job succeeded")?;
        Ok(())
    }

    async fn requeue(&self, job_id: Uuid, retry_at: DateTime<Utc>, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scraper_jobs
            SET status = 'pending',
                run_at = $1,
                retry_count = retry_count + 1,
                error_message = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(retry_at)
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to re-queue job")?;
        Ok(())
    }

    async fn dead_letter(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scraper_jobs
            SET status = 'dead_letter', error_message = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("Failed to dead-letter job")?;
        Ok(())
    }
}

pub struct DetailWorker<J, S, C, R> {
    store: J,
    detail: DetailJob<S, C, R>,
    poll_interval: Duration,
}

impl<J, S, C, R> DetailWorker<J, S, C, R>
where
    J: JobStore,
    S: ScraperStorage,
    C: CommanderSource,
    R: CardResolver,
{
    pub fn new(store: J, detail: DetailJob<S, C, R>, poll_interval: Duration) -> Self {
        Self {
            store,
            detail,
            poll_interval,
        }
    }

    /// Poll until the process exits.
    pub async fn run(self) {
        info!(poll_secs = self.poll_interval.as_secs(), "detail worker started");
        loop {
            if let Err(err) = self.tick().await {
                error!(error = %err, "detail worker tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Claim and execute one batch of due jobs.
    ///
    /// Only the claim itself can fail this function. Everything after
    /// is per-job: a bookkeeping error on one job is logged and the
    /// loop moves on, leaving that row to the stale-claim sweep.
    async fn tick(&self) -> Result<()> {
        let claimed = self.store.claim_due(CLAIM_BATCH).await?;

        for job in claimed {
            let command: ScraperCommand = match serde_json::from_value(job.args.clone()) {
                Ok(command) => command,
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "undecodable job payload, dead-lettering");
                    if let Err(e) = self
                        .store
                        .dead_letter(job.id, &format!("bad payload: {err}"))
                        .await
                    {
                        error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                    }
                    continue;
                }
            };

            match self.execute(command).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_succeeded(job.id).await {
                        error!(job_id = %job.id, error = %e, "failed to mark job succeeded");
                    }
                }
                Err(err) => self.mark_failed(&job, &err.to_string()).await,
            }
        }
        Ok(())
    }

    async fn execute(&self, command: ScraperCommand) -> Result<()> {
        match command {
            ScraperCommand::ScrapeCommanderDetail { commander_id } => {
                self.detail.run(commander_id).await?;
                Ok(())
            }
        }
    }

    async fn mark_failed(&self, job: &ClaimedJob, error: &str) {
        if job.retry_count < job.max_retries {
            let retry_at = Utc::now() + chrono::Duration::seconds(retry_delay_secs(job.retry_count));
            warn!(job_id = %job.id, retry_count = job.retry_count, %retry_at, error, "job failed, scheduling retry");
            if let Err(e) = self.store.requeue(job.id, retry_at, error).await {
                error!(job_id = %job.id, error = %e, "failed to re-queue job");
            }
        } else {
            error!(job_id = %job.id, retry_count = job.retry_count, error, "job failed, retries exhausted");
            if let Err(e) = self.store.dead_letter(job.id, error).await {
                error!(job_id = %job.id, error = %e, "failed to dead-letter job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use edhrec_scraper::testing::{
        InMemoryScraperStorage, MockCommanderSource, StaticCardResolver,
    };
    use edhrec_scraper::types::{DeckEntry, RankedCommander};

    #[derive(Clone)]
    struct JobRow {
        args: serde_json::Value,
        status: String,
        run_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        retry_count: i32,
        max_retries: i32,
        error_message: Option<String>,
    }

    /// In-memory store mirroring the Postgres claim semantics: due
    /// pending rows plus stale running rows, claimed in run_at order.
    #[derive(Clone, Default)]
    struct InMemoryJobStore {
        jobs: Arc<Mutex<HashMap<Uuid, JobRow>>>,
        failing_marks: Arc<Mutex<HashSet<Uuid>>>,
    }

    impl InMemoryJobStore {
        fn insert(&self, args: serde_json::Value, run_at: DateTime<Utc>) -> Uuid {
            let id = Uuid::new_v4();
            self.jobs.lock().unwrap().insert(
                id,
                JobRow {
                    args,
                    status: "pending".to_string(),
                    run_at,
                    updated_at: run_at,
                    retry_count: 0,
                    max_retries: 3,
                    error_message: None,
                },
            );
            id
        }

        /// Make `mark_succeeded` fail once for this job.
        fn fail_next_mark(&self, job_id: Uuid) {
            self.failing_marks.lock().unwrap().insert(job_id);
        }

        fn status(&self, job_id: Uuid) -> String {
            self.jobs.lock().unwrap()[&job_id].status.clone()
        }

        fn row(&self, job_id: Uuid) -> JobRow {
            self.jobs.lock().unwrap()[&job_id].clone()
        }

        fn age_claim(&self, job_id: Uuid, by: chrono::Duration) {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.get_mut(&job_id).unwrap().updated_at -= by;
        }

        fn make_due(&self, job_id: Uuid) {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.get_mut(&job_id).unwrap().run_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn claim_due(&self, batch: i64) -> Result<Vec<ClaimedJob>> {
            let now = Utc::now();
            let stale_before = now - chrono::Duration::from_std(CLAIM_TIMEOUT).unwrap();
            let mut jobs = self.jobs.lock().unwrap();

            let mut due: Vec<Uuid> = jobs
                .iter()
                .filter(|(_, row)| {
                    (row.status == "pending" && row.run_at <= now)
                        || (row.status == "running" && row.updated_at < stale_before)
                })
                .map(|(id, _)| *id)
                .collect();
            due.sort_by_key(|id| jobs[id].run_at);
            due.truncate(batch as usize);

            Ok(due
                .into_iter()
                .map(|id| {
                    let row = jobs.get_mut(&id).unwrap();
                    row.status = "running".to_string();
                    row.updated_at = now;
                    ClaimedJob {
                        id,
                        args: row.args.clone(),
                        retry_count: row.retry_count,
                        max_retries: row.max_retries,
                    }
                })
                .collect())
        }

        async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
            if self.failing_marks.lock().unwrap().remove(&job_id) {
                return Err(anyhow!("connection reset"));
            }
            self.jobs.lock().unwrap().get_mut(&job_id).unwrap().status =
                "succeeded".to_string();
            Ok(())
        }

        async fn requeue(&self, job_id: Uuid, retry_at: DateTime<Utc>, error: &str) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            let row = jobs.get_mut(&job_id).unwrap();
            row.status = "pending".to_string();
            row.run_at = retry_at;
            row.retry_count += 1;
            row.error_message = Some(error.to_string());
            Ok(())
        }

        async fn dead_letter(&self, job_id: Uuid, error: &str) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            let row = jobs.get_mut(&job_id).unwrap();
            row.status = "dead_letter".to_string();
            row.error_message = Some(error.to_string());
            Ok(())
        }
    }

    async fn seeded_commander(
        storage: &InMemoryScraperStorage,
        source: MockCommanderSource,
        name: &str,
    ) -> (Uuid, MockCommanderSource) {
        let url = format!("https://edhrec.com/commanders/{}", name.to_lowercase());
        let id = storage
            .upsert_commander(&RankedCommander {
                name: name.to_string(),
                rank: 1,
                url: url.clone(),
            })
            .await
            .unwrap();
        let source = source.with_decklist(
            url,
            vec![DeckEntry {
                card_name: name.to_string(),
                category: "commander".to_string(),
                is_commander: true,
                external_card_id: None,
            }],
        );
        (id, source)
    }

    fn detail_args(commander_id: Uuid) -> serde_json::Value {
        serde_json::to_value(ScraperCommand::ScrapeCommanderDetail { commander_id }).unwrap()
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay_secs(0), 1);
        assert_eq!(retry_delay_secs(1), 2);
        assert_eq!(retry_delay_secs(5), 32);
        assert_eq!(retry_delay_secs(30), 3600);
    }

    #[tokio::test]
    async fn bookkeeping_failure_does_not_abandon_the_batch() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let source = MockCommanderSource::new();
        let (a, source) = seeded_commander(&storage, source, "Atraxa").await;
        let (b, source) = seeded_commander(&storage, source, "Edgar").await;

        let store = InMemoryJobStore::default();
        let base = Utc::now() - chrono::Duration::seconds(10);
        let job_a = store.insert(detail_args(a), base);
        let job_b = store.insert(detail_args(b), base + chrono::Duration::seconds(1));
        store.fail_next_mark(job_a);

        let worker = DetailWorker::new(
            store.clone(),
            DetailJob::new(storage.clone(), source, StaticCardResolver::new()),
            Duration::from_secs(1),
        );

        worker.tick().await.unwrap();

        // Both jobs executed even though marking the first one failed.
        assert_eq!(storage.decklist_count(), 2);
        assert_eq!(store.status(job_b), "succeeded");
        // The unacked job stays 'running' for the stale-claim sweep.
        assert_eq!(store.status(job_a), "running");
    }

    #[tokio::test]
    async fn stale_running_jobs_are_reclaimed() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let source = MockCommanderSource::new();
        let (a, source) = seeded_commander(&storage, source, "Atraxa").await;

        let store = InMemoryJobStore::default();
        let job_a = store.insert(detail_args(a), Utc::now() - chrono::Duration::seconds(10));
        store.fail_next_mark(job_a);

        let worker = DetailWorker::new(
            store.clone(),
            DetailJob::new(storage.clone(), source, StaticCardResolver::new()),
            Duration::from_secs(1),
        );

        // First pass executes the job but the ack is lost.
        worker.tick().await.unwrap();
        assert_eq!(store.status(job_a), "running");

        // A fresh claim skips it while its claim is recent.
        worker.tick().await.unwrap();
        assert_eq!(store.status(job_a), "running");

        // Past the claim timeout it becomes claimable again.
        store.age_claim(job_a, chrono::Duration::from_std(CLAIM_TIMEOUT).unwrap() * 2);
        worker.tick().await.unwrap();
        assert_eq!(store.status(job_a), "succeeded");
    }

    #[tokio::test]
    async fn undecodable_payload_is_dead_lettered() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let store = InMemoryJobStore::default();
        let job = store.insert(
            serde_json::json!({"type": "unknown_command"}),
            Utc::now() - chrono::Duration::seconds(10),
        );

        let worker = DetailWorker::new(
            store.clone(),
            DetailJob::new(
                storage,
                MockCommanderSource::new(),
                StaticCardResolver::new(),
            ),
            Duration::from_secs(1),
        );

        worker.tick().await.unwrap();
        let row = store.row(job);
        assert_eq!(row.status, "dead_letter");
        assert!(row.error_message.unwrap().starts_with("bad payload: "));
    }

    #[tokio::test]
    async fn failed_job_is_requeued_with_backoff_then_dead_lettered() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let url = "https://edhrec.com/commanders/edgar";
        let id = storage
            .upsert_commander(&RankedCommander {
                name: "Edgar".to_string(),
                rank: 1,
                url: url.to_string(),
            })
            .await
            .unwrap();
        let source = MockCommanderSource::new().with_decklist_failure(url, "FetchError");

        let store = InMemoryJobStore::default();
        let job = store.insert(detail_args(id), Utc::now() - chrono::Duration::seconds(10));

        let worker = DetailWorker::new(
            store.clone(),
            DetailJob::new(storage, source, StaticCardResolver::new()),
            Duration::from_secs(1),
        );

        worker.tick().await.unwrap();
        let row = store.row(job);
        assert_eq!(row.status, "pending");
        assert_eq!(row.retry_count, 1);
        assert!(row.error_message.is_some());

        // Exhaust the retry budget.
        for _ in 0..3 {
            store.make_due(job);
            worker.tick().await.unwrap();
        }
        assert_eq!(store.status(job), "dead_letter");
    }
}
