//! Testing utilities including mock implementations.
//!
//! Useful for exercising the job pipeline and the admin API without a
//! database or network access. State lives behind `Arc<RwLock<...>>` so
//! clones share it and tests can assert on what the pipeline did.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::client::CommanderSource;
use crate::commands::ScraperCommand;
use crate::error::{ScrapeError, ScrapeResult};
use crate::traits::{CardResolver, JobQueue, ScraperStorage};
use crate::types::{
    Commander, DeckEntry, ExecutionFilter, ExecutionOutcome, ExecutionRecord, ExecutionStats,
    ExecutionStatus, RankedCommander,
};

fn simulated_error(kind: &str, context: &str) -> ScrapeError {
    match kind {
        "RateLimitError" => ScrapeError::RateLimited {
            source_key: "edhrec".to_string(),
        },
        _ => ScrapeError::fetch(context, "simulated failure"),
    }
}

// ============================================================================
// MOCK SOURCE
// ============================================================================

/// A mock commander source with configurable responses and failures.
#[derive(Clone, Default)]
pub struct MockCommanderSource {
    commanders: Arc<RwLock<Option<Vec<RankedCommander>>>>,
    top_failure: Arc<RwLock<Option<String>>>,
    decklists: Arc<RwLock<HashMap<String, Vec<DeckEntry>>>>,
    decklist_failures: Arc<RwLock<HashMap<String, String>>>,
    cache_clears: Arc<RwLock<usize>>,
}

impl MockCommanderSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ranked list returned by `fetch_top_commanders`.
    pub fn with_commanders(self, commanders: Vec<RankedCommander>) -> Self {
        *self.commanders.write().unwrap() = Some(commanders);
        self
    }

    /// Make `fetch_top_commanders` fail with the given error kind
    /// (`"FetchError"` or `"RateLimitError"`).
    pub fn with_top_commanders_failure(self, kind: impl Into<String>) -> Self {
        *self.top_failure.write().unwrap() = Some(kind.into());
        self
    }

    /// Set the decklist returned for a commander page URL.
    pub fn with_decklist(self, url: impl Into<String>, entries: Vec<DeckEntry>) -> Self {
        self.decklists.write().unwrap().insert(url.into(), entries);
        self
    }

    /// Make `fetch_commander_decklist` fail for one URL.
    pub fn with_decklist_failure(self, url: impl Into<String>, kind: impl Into<String>) -> Self {
        self.decklist_failures
            .write()
            .unwrap()
            .insert(url.into(), kind.into());
        self
    }

    /// Number of `clear_cache` calls observed.
    pub fn cache_clears(&self) -> usize {
        *self.cache_clears.read().unwrap()
    }
}

#[async_trait]
impl CommanderSource for MockCommanderSource {
    async fn fetch_top_commanders(&self) -> ScrapeResult<Vec<RankedCommander>> {
        if let Some(kind) = self.top_failure.read().unwrap().as_deref() {
            return Err(simulated_error(kind, "top commanders"));
        }
        self.commanders
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| ScrapeError::fetch("top commanders", "no commander list configured"))
    }

    async fn fetch_commander_decklist(&self, url: &str) -> ScrapeResult<Vec<DeckEntry>> {
        if let Some(kind) = self.decklist_failures.read().unwrap().get(url) {
            return Err(simulated_error(kind, url));
        }
        self.decklists
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::fetch(url, "no decklist configured"))
    }

    fn clear_cache(&self) {
        *self.cache_clears.write().unwrap() += 1;
    }
}

// ============================================================================
// IN-MEMORY STORAGE
// ============================================================================

/// In-memory `ScraperStorage` implementation.
///
/// Mirrors the Postgres implementation's semantics: name-keyed upserts
/// that never touch `last_scraped_at`, atomic decklist replacement, and
/// conjunctive execution filters.
#[derive(Clone, Default)]
pub struct InMemoryScraperStorage {
    commanders: Arc<RwLock<HashMap<Uuid, Commander>>>,
    decklists: Arc<RwLock<HashMap<Uuid, Vec<DeckEntry>>>>,
    executions: Arc<RwLock<HashMap<Uuid, ExecutionRecord>>>,
    failing_upserts: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryScraperStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make upserts fail for the named commanders (simulates data-layer
    /// validation errors).
    pub fn with_failing_upserts(self, names: Vec<String>) -> Self {
        *self.failing_upserts.write().unwrap() = names.into_iter().collect();
        self
    }

    pub fn commander_count(&self) -> usize {
        self.commanders.read().unwrap().len()
    }

    pub fn decklist_count(&self) -> usize {
        self.decklists.read().unwrap().len()
    }

    /// Seed a finalized execution record directly (for query/stats tests).
    pub fn insert_execution(&self, record: ExecutionRecord) {
        self.executions.write().unwrap().insert(record.id, record);
    }
}

#[async_trait]
impl ScraperStorage for InMemoryScraperStorage {
    async fn upsert_commander(&self, commander: &RankedCommander) -> Result<Uuid> {
        if self.failing_upserts.read().unwrap().contains(&commander.name) {
            return Err(anyhow!("validation failed for '{}'", commander.name));
        }

        let mut commanders = self.commanders.write().unwrap();
        if let Some(existing) = commanders.values_mut().find(|c| c.name == commander.name) {
            existing.rank = commander.rank;
            existing.updated_at = Utc::now();
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        commanders.insert(
            id,
            Commander {
                id,
                name: commander.name.clone(),
                rank: commander.rank,
                source_url: commander.url.clone(),
                last_scraped_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_commander(&self, id: Uuid) -> Result<Option<Commander>> {
        Ok(self.commanders.read().unwrap().get(&id).cloned())
    }

    async fn get_commander_by_name(&self, name: &str) -> Result<Option<Commander>> {
        Ok(self
            .commanders
            .read()
            .unwrap()
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn replace_decklist(
        &self,
        commander_id: Uuid,
        entries: &[DeckEntry],
        scraped_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut commanders = self.commanders.write().unwrap();
        let commander = commanders
            .get_mut(&commander_id)
            .ok_or_else(|| anyhow!("commander {commander_id} not found"))?;
        self.decklists
            .write()
            .unwrap()
            .insert(commander_id, entries.to_vec());
        commander.last_scraped_at = Some(scraped_at);
        commander.updated_at = Utc::now();
        Ok(())
    }

    async fn get_decklist(&self, commander_id: Uuid) -> Result<Option<Vec<DeckEntry>>> {
        Ok(self.decklists.read().unwrap().get(&commander_id).cloned())
    }

    async fn create_execution(&self, started_at: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.executions.write().unwrap().insert(
            id,
            ExecutionRecord {
                id,
                status: ExecutionStatus::Pending,
                started_at,
                finished_at: None,
                commanders_attempted: 0,
                commanders_succeeded: 0,
                commanders_failed: 0,
                error_summary: None,
            },
        );
        Ok(id)
    }

    async fn finalize_execution(&self, id: Uuid, outcome: &ExecutionOutcome) -> Result<()> {
        let mut executions = self.executions.write().unwrap();
        let record = executions
            .get_mut(&id)
            .ok_or_else(|| anyhow!("execution {id} not found"))?;
        record.status = outcome.status;
        record.finished_at = Some(outcome.finished_at);
        record.commanders_attempted = outcome.commanders_attempted;
        record.commanders_succeeded = outcome.commanders_succeeded;
        record.commanders_failed = outcome.commanders_failed;
        record.error_summary = outcome.error_summary.clone();
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        Ok(self.executions.read().unwrap().get(&id).cloned())
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>> {
        let mut records: Vec<ExecutionRecord> = self
            .executions
            .read()
            .unwrap()
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.started_after.map_or(true, |t| r.started_at >= t))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }

    async fn execution_stats(&self) -> Result<ExecutionStats> {
        let executions = self.executions.read().unwrap();
        let total = executions.len() as i64;
        let count = |status: ExecutionStatus| {
            executions.values().filter(|r| r.status == status).count() as i64
        };
        Ok(ExecutionStats::from_counts(
            total,
            count(ExecutionStatus::Success),
            count(ExecutionStatus::Failure),
            count(ExecutionStatus::PartialSuccess),
        ))
    }
}

// ============================================================================
// RECORDING JOB QUEUE
// ============================================================================

/// One captured scheduling call.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: Uuid,
    pub command: ScraperCommand,
    pub run_at: DateTime<Utc>,
}

/// Job queue double that records every `schedule` call.
#[derive(Clone, Default)]
pub struct RecordingJobQueue {
    scheduled: Arc<RwLock<Vec<ScheduledJob>>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured calls, in scheduling order.
    pub fn scheduled(&self) -> Vec<ScheduledJob> {
        self.scheduled.read().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn schedule(&self, command: ScraperCommand, run_at: DateTime<Utc>) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        self.scheduled.write().unwrap().push(ScheduledJob {
            job_id,
            command,
            run_at,
        });
        Ok(job_id)
    }
}

// ============================================================================
// STATIC CARD RESOLVER
// ============================================================================

/// Card resolver double backed by a fixed name → id map.
#[derive(Clone, Default)]
pub struct StaticCardResolver {
    cards: Arc<RwLock<HashMap<String, String>>>,
    failures: Arc<RwLock<HashSet<String>>>,
}

impl StaticCardResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_card(self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.cards.write().unwrap().insert(name.into(), id.into());
        self
    }

    /// Make resolution fail for one card name.
    pub fn with_failure(self, name: impl Into<String>) -> Self {
        self.failures.write().unwrap().insert(name.into());
        self
    }
}

#[async_trait]
impl CardResolver for StaticCardResolver {
    async fn resolve(&self, card_name: &str) -> Result<Option<String>> {
        if self.failures.read().unwrap().contains(card_name) {
            return Err(anyhow!("resolver unavailable for '{card_name}'"));
        }
        Ok(self.cards.read().unwrap().get(card_name).cloned())
    }
}

/// Build a finalized execution record for seeding query/stats tests.
pub fn finalized_execution(
    status: ExecutionStatus,
    started_at: DateTime<Utc>,
    attempted: i32,
    succeeded: i32,
) -> ExecutionRecord {
    let failed = attempted - succeeded;
    ExecutionRecord {
        id: Uuid::new_v4(),
        status,
        started_at,
        finished_at: Some(started_at + chrono::Duration::seconds(30)),
        commanders_attempted: attempted,
        commanders_succeeded: succeeded,
        commanders_failed: failed,
        error_summary: match status {
            ExecutionStatus::Failure => Some("FetchError: simulated failure".to_string()),
            ExecutionStatus::PartialSuccess => {
                Some("UpsertError: simulated validation error".to_string())
            }
            _ => None,
        },
    }
}
