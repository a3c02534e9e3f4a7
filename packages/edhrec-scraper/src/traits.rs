//! Trait seams between the scraping pipeline and its collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use anyhow::Result;

use crate::commands::ScraperCommand;
use crate::types::{
    Commander, DeckEntry, ExecutionFilter, ExecutionOutcome, ExecutionRecord, ExecutionStats,
    RankedCommander,
};

// ============================================================================
// STORAGE: commanders, decklists, execution audit trail
// ============================================================================

#[async_trait]
pub trait ScraperStorage: Send + Sync {
    /// Create-or-update keyed by commander name. An existing commander
    /// gets its rank overwritten; `last_scraped_at` is never touched.
    /// Returns the commander id.
    async fn upsert_commander(&self, commander: &RankedCommander) -> Result<Uuid>;

    async fn get_commander(&self, id: Uuid) -> Result<Option<Commander>>;

    async fn get_commander_by_name(&self, name: &str) -> Result<Option<Commander>>;

    /// Replace the commander's decklist wholesale and stamp
    /// `last_scraped_at = scraped_at`, atomically. A prior decklist
    /// survives any failure untouched.
    async fn replace_decklist(
        &self,
        commander_id: Uuid,
        entries: &[DeckEntry],
        scraped_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Current decklist in stored order, `None` if never scraped.
    async fn get_decklist(&self, commander_id: Uuid) -> Result<Option<Vec<DeckEntry>>>;

    /// Open a pending execution record for a discovery run.
    async fn create_execution(&self, started_at: DateTime<Utc>) -> Result<Uuid>;

    /// Finalize the record opened by `create_execution`.
    async fn finalize_execution(&self, id: Uuid, outcome: &ExecutionOutcome) -> Result<()>;

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>>;

    /// Executions matching every filter predicate, newest first.
    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>>;

    async fn execution_stats(&self) -> Result<ExecutionStats>;
}

// ============================================================================
// JOB QUEUE: scheduling primitive (at-least-once, runner-managed retry)
// ============================================================================

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule a command to run at (or after) `run_at`.
    /// Returns the queued job's id.
    async fn schedule(&self, command: ScraperCommand, run_at: DateTime<Utc>) -> Result<Uuid>;
}

// ============================================================================
// CARD RESOLVER: external card-identity collaborator with its own cache
// ============================================================================

#[async_trait]
pub trait CardResolver: Send + Sync {
    /// Canonical external id for a card name, `None` when unknown.
    async fn resolve(&self, card_name: &str) -> Result<Option<String>>;
}

// ============================================================================
// ARC FORWARDING (jobs hold seams by value; Arc shares them)
// ============================================================================

#[async_trait]
impl<T: ScraperStorage + ?Sized> ScraperStorage for std::sync::Arc<T> {
    async fn upsert_commander(&self, commander: &RankedCommander) -> Result<Uuid> {
        (**self).upsert_commander(commander).await
    }

    async fn get_commander(&self, id: Uuid) -> Result<Option<Commander>> {
        (**self).get_commander(id).await
    }

    async fn get_commander_by_name(&self, name: &str) -> Result<Option<Commander>> {
        (**self).get_commander_by_name(name).await
    }

    async fn replace_decklist(
        &self,
        commander_id: Uuid,
        entries: &[DeckEntry],
        scraped_at: DateTime<Utc>,
    ) -> Result<()> {
        (**self).replace_decklist(commander_id, entries, scraped_at).await
    }

    async fn get_decklist(&self, commander_id: Uuid) -> Result<Option<Vec<DeckEntry>>> {
        (**self).get_decklist(commander_id).await
    }

    async fn create_execution(&self, started_at: DateTime<Utc>) -> Result<Uuid> {
        (**self).create_execution(started_at).await
    }

    async fn finalize_execution(&self, id: Uuid, outcome: &ExecutionOutcome) -> Result<()> {
        (**self).finalize_execution(id, outcome).await
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        (**self).get_execution(id).await
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>> {
        (**self).list_executions(filter).await
    }

    async fn execution_stats(&self) -> Result<ExecutionStats> {
        (**self).execution_stats().await
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for std::sync::Arc<T> {
    async fn schedule(&self, command: ScraperCommand, run_at: DateTime<Utc>) -> Result<Uuid> {
        (**self).schedule(command, run_at).await
    }
}

#[async_trait]
impl<T: CardResolver + ?Sized> CardResolver for std::sync::Arc<T> {
    async fn resolve(&self, card_name: &str) -> Result<Option<String>> {
        (**self).resolve(card_name).await
    }
}
