//! Periodic discovery scheduling.
//!
//! The cron job runs a full discovery pass over the ranked commander
//! list; the detail work it produces goes through `scraper_jobs` and is
//! picked up by the detail worker, not executed here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use edhrec_scraper::{DiscoveryJob, EdhrecClient, PostgresScraperStorage};

use crate::jobs::PostgresJobQueue;

/// Start the discovery cron job.
pub async fn start_scheduler(
    cron: &str,
    storage: Arc<PostgresScraperStorage>,
    source: Arc<EdhrecClient>,
    queue: Arc<PostgresJobQueue>,
    detail_stagger: Duration,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let discovery_job = Job::new_async(cron, move |_uuid, _lock| {
        let storage = storage.clone();
        let source = source.clone();
        let queue = queue.clone();
        Box::pin(async move {
            let job = DiscoveryJob::new(storage, source, queue)
                .with_detail_stagger(detail_stagger);
            match job.run().await {
                Ok(report) => {
                    tracing::info!(
                        execution_id = %report.execution_id,
                        attempted = report.commanders_attempted,
                        succeeded = report.commanders_succeeded,
                        failed = report.commanders_failed,
                        "discovery run finished"
                    );
                }
                Err(e) => {
                    tracing::error!("Discovery run failed: {}", e);
                }
            }
        })
    })?;

    scheduler.add(discovery_job).await?;
    scheduler.start().await?;

    tracing::info!(cron, "Scheduled tasks started (periodic commander discovery)");
    Ok(scheduler)
}
