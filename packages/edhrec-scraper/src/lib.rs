//! Commander scraping pipeline for the deckbox server.
//!
//! Two-phase ingestion from EDHREC: a discovery run over the ranked
//! commander list, then one staggered, independently retried detail job
//! per commander. Every discovery run leaves a durable execution record
//! behind for the admin API.

pub mod client;
pub mod commands;
pub mod error;
pub mod jobs;
pub mod rate_limiter;
pub mod resolver;
pub mod storage;
pub mod testing;
pub mod traits;
pub mod types;

// Re-exports for clean API
pub use client::{CommanderSource, EdhrecClient, SOURCE_KEY};
pub use commands::ScraperCommand;
pub use error::{ScrapeError, ScrapeResult};
pub use jobs::{DetailJob, DiscoveryJob};
pub use rate_limiter::{RateLimitConfig, SourceRateLimiter};
pub use resolver::ScryfallCardResolver;
pub use storage::PostgresScraperStorage;
pub use traits::{CardResolver, JobQueue, ScraperStorage};
pub use types::{
    Commander, DeckEntry, DetailOutcome, DiscoveryReport, ExecutionFilter, ExecutionOutcome,
    ExecutionRecord, ExecutionStats, ExecutionStatus, RankedCommander,
};
