//! Discovery run: fetch the ranked commander list, upsert commanders,
//! and schedule one staggered detail job per commander.
//!
//! Every run opens an execution record and finalizes it on every exit
//! path. When the source fetch fails the record is persisted *before*
//! the error is re-raised, so the audit trail and the runner's retry
//! policy both see the failure.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::CommanderSource;
use crate::commands::ScraperCommand;
use crate::error::{ScrapeError, ScrapeResult};
use crate::traits::{JobQueue, ScraperStorage};
use crate::types::{DiscoveryReport, ExecutionOutcome};

/// Default spacing between consecutive detail jobs. The source tolerates
/// roughly one scrape per hour before its anti-scraping defenses engage;
/// staggering guarantees no two detail fetches race within the same hour
/// regardless of worker concurrency.
pub const DEFAULT_DETAIL_STAGGER: Duration = Duration::from_secs(3600);

/// Discovery job over storage, source, and scheduling seams.
pub struct DiscoveryJob<S, C, Q> {
    storage: S,
    source: C,
    queue: Q,
    detail_stagger: Duration,
}

impl<S, C, Q> DiscoveryJob<S, C, Q>
where
    S: ScraperStorage,
    C: CommanderSource,
    Q: JobQueue,
{
    pub fn new(storage: S, source: C, queue: Q) -> Self {
        Self {
            storage,
            source,
            queue,
            detail_stagger: DEFAULT_DETAIL_STAGGER,
        }
    }

    /// Override the spacing between consecutive detail jobs.
    pub fn with_detail_stagger(mut self, stagger: Duration) -> Self {
        self.detail_stagger = stagger;
        self
    }

    /// Execute one discovery run.
    pub async fn run(&self) -> ScrapeResult<DiscoveryReport> {
        let started_at = Utc::now();
        let execution_id = self.storage.create_execution(started_at).await?;
        info!(%execution_id, "discovery run started");

        let commanders = match self.source.fetch_top_commanders().await {
            Ok(commanders) => commanders,
            Err(err) => {
                error!(%execution_id, error = %err, "commander list fetch failed");
                let outcome = ExecutionOutcome::aborted(&err, Utc::now());
                if let Err(persist_err) =
                    self.storage.finalize_execution(execution_id, &outcome).await
                {
                    // The original error still propagates; losing the
                    // audit row must not mask the fetch failure.
                    error!(
                        %execution_id,
                        error = %persist_err,
                        "failed to finalize aborted execution record"
                    );
                }
                return Err(err);
            }
        };

        let mut succeeded: i32 = 0;
        let mut failed: i32 = 0;
        let mut first_upsert_error: Option<String> = None;
        let mut upserted: Vec<Uuid> = Vec::with_capacity(commanders.len());

        for commander in &commanders {
            match self.storage.upsert_commander(commander).await {
                Ok(id) => {
                    succeeded += 1;
                    upserted.push(id);
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        commander = %commander.name,
                        rank = commander.rank,
                        error = %err,
                        "commander upsert failed"
                    );
                    if first_upsert_error.is_none() {
                        first_upsert_error = Some(format!("UpsertError: {err}"));
                    }
                }
            }
        }
        let attempted = succeeded + failed;

        let scheduled = self.schedule_detail_jobs(&upserted).await;

        let outcome = ExecutionOutcome::from_counts(
            attempted,
            succeeded,
            failed,
            Utc::now(),
            first_upsert_error,
        );
        let status = outcome.status;
        self.storage.finalize_execution(execution_id, &outcome).await?;

        info!(
            %execution_id,
            status = status.as_str(),
            attempted,
            succeeded,
            failed,
            scheduled,
            "discovery run finished"
        );

        Ok(DiscoveryReport {
            execution_id,
            commanders_attempted: attempted,
            commanders_succeeded: succeeded,
            commanders_failed: failed,
            detail_jobs_scheduled: scheduled,
        })
    }

    /// Schedule one detail job per commander, in discovery order, the
    /// i-th delayed by `i × stagger` (the first runs immediately).
    /// Enqueue failures are logged and skipped; they never abort the run
    /// or alter the upsert counters.
    async fn schedule_detail_jobs(&self, commander_ids: &[Uuid]) -> usize {
        let now = Utc::now();
        let stagger = chrono::Duration::from_std(self.detail_stagger)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut scheduled = 0usize;
        for (i, &commander_id) in commander_ids.iter().enumerate() {
            let run_at = now + stagger * i as i32;
            let command = ScraperCommand::ScrapeCommanderDetail { commander_id };
            match self.queue.schedule(command, run_at).await {
                Ok(job_id) => {
                    scheduled += 1;
                    tracing::debug!(%commander_id, %job_id, %run_at, "detail job scheduled");
                }
                Err(err) => {
                    warn!(%commander_id, error = %err, "failed to schedule detail job");
                }
            }
        }
        scheduled
    }
}
