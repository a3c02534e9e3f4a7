use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScrapeError;

// ============================================================================
// COMMANDERS & DECKLISTS
// ============================================================================

/// One entry from the source's ranked commander list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCommander {
    pub name: String,
    /// 1-based, contiguous in list order.
    pub rank: i32,
    pub url: String,
}

/// A persisted commander.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commander {
    pub id: Uuid,
    pub name: String,
    pub rank: i32,
    pub source_url: String,
    /// Set only by a successful detail scrape, never by discovery.
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One card in a commander's decklist, in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckEntry {
    pub card_name: String,
    pub category: String,
    pub is_commander: bool,
    pub external_card_id: Option<String>,
}

// ============================================================================
// EXECUTION RECORDS
// ============================================================================

/// Lifecycle status of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failure,
    PartialSuccess,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::PartialSuccess => "partial_success",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "partial_success" => Some(Self::PartialSuccess),
            _ => None,
        }
    }

    /// Derive the final status from the run counters.
    pub fn from_counts(attempted: i32, succeeded: i32, failed: i32) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded == 0 && attempted > 0 {
            Self::Failure
        } else {
            Self::PartialSuccess
        }
    }
}

/// Durable record of one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub commanders_attempted: i32,
    pub commanders_succeeded: i32,
    pub commanders_failed: i32,
    pub error_summary: Option<String>,
}

impl ExecutionRecord {
    /// Wall-clock duration of the run, once finalized.
    pub fn execution_time_seconds(&self) -> Option<f64> {
        self.finished_at.map(|finished| {
            let millis = (finished - self.started_at).num_milliseconds();
            round1(millis as f64 / 1000.0)
        })
    }

    /// Succeeded / attempted as a percentage, one decimal.
    /// `0.0` when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        success_rate(self.commanders_succeeded as i64, self.commanders_attempted as i64)
    }
}

/// Finalization payload written at the end of a discovery run.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub finished_at: DateTime<Utc>,
    pub commanders_attempted: i32,
    pub commanders_succeeded: i32,
    pub commanders_failed: i32,
    pub error_summary: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for a run that failed before any commander was attempted.
    pub fn aborted(err: &ScrapeError, finished_at: DateTime<Utc>) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            finished_at,
            commanders_attempted: 0,
            commanders_succeeded: 0,
            commanders_failed: 0,
            error_summary: Some(err.summary()),
        }
    }

    /// Outcome derived from per-commander counters.
    pub fn from_counts(
        attempted: i32,
        succeeded: i32,
        failed: i32,
        finished_at: DateTime<Utc>,
        error_summary: Option<String>,
    ) -> Self {
        Self {
            status: ExecutionStatus::from_counts(attempted, succeeded, failed),
            finished_at,
            commanders_attempted: attempted,
            commanders_succeeded: succeeded,
            commanders_failed: failed,
            error_summary,
        }
    }
}

/// Conjunctive filters for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    /// Inclusive lower bound on `started_at`.
    pub started_after: Option<DateTime<Utc>>,
}

/// Aggregate statistics over all executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    pub partial_success_executions: i64,
    pub success_rate: f64,
}

impl ExecutionStats {
    pub fn from_counts(total: i64, successful: i64, failed: i64, partial: i64) -> Self {
        Self {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            partial_success_executions: partial,
            success_rate: success_rate(successful, total),
        }
    }
}

// ============================================================================
// JOB OUTCOMES
// ============================================================================

/// Summary of one discovery run, returned to the caller on success.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub execution_id: Uuid,
    pub commanders_attempted: i32,
    pub commanders_succeeded: i32,
    pub commanders_failed: i32,
    pub detail_jobs_scheduled: usize,
}

/// Result of a single detail run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOutcome {
    /// Commander no longer exists; not a failure of this job.
    Skipped,
    /// Decklist replaced with `cards` entries.
    Scraped { cards: usize },
}

/// Percentage with one decimal place, `0.0` for an empty denominator.
pub(crate) fn success_rate(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(numerator as f64 / denominator as f64 * 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
