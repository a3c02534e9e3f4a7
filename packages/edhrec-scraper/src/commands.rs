//! Serializable command payloads handed to the job queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commands dispatched through the scheduling primitive.
///
/// Each variant is an independent unit of work; the queue stores the
/// serialized payload and the runner deserializes it at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScraperCommand {
    /// Fetch and persist one commander's decklist.
    ScrapeCommanderDetail { commander_id: Uuid },
}

impl ScraperCommand {
    /// Job type name stored alongside the payload.
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::ScrapeCommanderDetail { .. } => "scrape_commander_detail",
        }
    }
}
