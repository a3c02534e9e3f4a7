//! Typed errors for the scraper library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can
//! branch on the throttled-vs-hard-failure distinction.

use thiserror::Error;

/// Errors raised by the scraping pipeline.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Transport or parse failure from the source site.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Request budget for a source is exhausted. Retryable after the
    /// window slides; callers decide whether to abort or reschedule.
    #[error("rate limit exceeded for source '{source_key}'")]
    RateLimited { source_key: String },

    /// Data-layer failure surfaced through a job.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ScrapeError {
    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Stable error-class name, used in execution record summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "FetchError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::Storage(_) => "StorageError",
        }
    }

    /// `"<ErrorClass>: <message>"` string for the audit trail.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// True when the failure is throttling rather than a hard fetch error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Result alias for scrape operations.
pub type ScrapeResult<T> = Result<T, ScrapeError>;
