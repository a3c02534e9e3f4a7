//! Detail run: fetch one commander's decklist and persist it.
//!
//! Each detail run is an independent scheduled unit. Failures propagate
//! untouched to the job runner so its retry/backoff policy applies and
//! one commander's failure can never suppress or delay another's. No
//! execution-record bookkeeping happens here; the runner's own
//! success/failure tracking covers detail jobs.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::CommanderSource;
use crate::error::ScrapeResult;
use crate::traits::{CardResolver, ScraperStorage};
use crate::types::DetailOutcome;

/// Per-commander detail job over storage, source, and resolver seams.
pub struct DetailJob<S, C, R> {
    storage: S,
    source: C,
    resolver: R,
}

impl<S, C, R> DetailJob<S, C, R>
where
    S: ScraperStorage,
    C: CommanderSource,
    R: CardResolver,
{
    pub fn new(storage: S, source: C, resolver: R) -> Self {
        Self {
            storage,
            source,
            resolver,
        }
    }

    /// Scrape one commander's decklist.
    ///
    /// A missing commander is a skip, not a failure: the row may have
    /// been deleted or renamed between discovery and this run.
    pub async fn run(&self, commander_id: Uuid) -> ScrapeResult<DetailOutcome> {
        let Some(commander) = self.storage.get_commander(commander_id).await? else {
            info!(%commander_id, "commander no longer exists, skipping detail scrape");
            return Ok(DetailOutcome::Skipped);
        };

        let mut entries = self
            .source
            .fetch_commander_decklist(&commander.source_url)
            .await?;

        // Best-effort identity resolution; an unresolvable card keeps a
        // NULL external id rather than failing the scrape.
        for entry in &mut entries {
            match self.resolver.resolve(&entry.card_name).await {
                Ok(id) => entry.external_card_id = id,
                Err(err) => {
                    warn!(card = %entry.card_name, error = %err, "card resolution failed");
                }
            }
        }

        let scraped_at = Utc::now();
        self.storage
            .replace_decklist(commander.id, &entries, scraped_at)
            .await?;

        info!(
            commander = %commander.name,
            cards = entries.len(),
            "decklist scraped"
        );
        Ok(DetailOutcome::Scraped {
            cards: entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryScraperStorage, MockCommanderSource, StaticCardResolver};
    use crate::types::{DeckEntry, RankedCommander};
    use std::sync::Arc;

    fn commander_entry(name: &str) -> DeckEntry {
        DeckEntry {
            card_name: name.to_string(),
            category: "commander".to_string(),
            is_commander: true,
            external_card_id: None,
        }
    }

    fn card_entry(name: &str, category: &str) -> DeckEntry {
        DeckEntry {
            card_name: name.to_string(),
            category: category.to_string(),
            is_commander: false,
            external_card_id: None,
        }
    }

    async fn seeded_commander(storage: &InMemoryScraperStorage, name: &str) -> Uuid {
        storage
            .upsert_commander(&RankedCommander {
                name: name.to_string(),
                rank: 1,
                url: format!("https://edhrec.com/commanders/{}", name.to_lowercase()),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn scrape_sets_last_scraped_at_and_stores_decklist() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let id = seeded_commander(&storage, "Atraxa").await;
        let url = "https://edhrec.com/commanders/atraxa";

        let source = MockCommanderSource::new().with_decklist(
            url,
            vec![
                commander_entry("Atraxa"),
                card_entry("Deepglow Skate", "High Synergy Cards"),
            ],
        );
        let resolver = StaticCardResolver::new().with_card("Deepglow Skate", "scry-123");
        let job = DetailJob::new(storage.clone(), source, resolver);

        let before = Utc::now();
        let outcome = job.run(id).await.unwrap();
        let after = Utc::now();

        assert_eq!(outcome, DetailOutcome::Scraped { cards: 2 });

        let commander = storage.get_commander(id).await.unwrap().unwrap();
        let scraped_at = commander.last_scraped_at.expect("last_scraped_at set");
        assert!(scraped_at >= before && scraped_at <= after);

        let decklist = storage.get_decklist(id).await.unwrap().unwrap();
        assert_eq!(decklist.len(), 2);
        assert!(decklist[0].is_commander);
        assert_eq!(decklist[1].external_card_id.as_deref(), Some("scry-123"));
        assert_eq!(decklist[0].external_card_id, None);
    }

    #[tokio::test]
    async fn missing_commander_is_skipped_without_error() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let source = MockCommanderSource::new();
        let job = DetailJob::new(storage.clone(), source, StaticCardResolver::new());

        let outcome = job.run(Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, DetailOutcome::Skipped);
        assert_eq!(storage.decklist_count(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_preserves_prior_decklist() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let id = seeded_commander(&storage, "Edgar").await;
        let url = "https://edhrec.com/commanders/edgar";

        // First scrape succeeds.
        let source = MockCommanderSource::new()
            .with_decklist(url, vec![commander_entry("Edgar")]);
        DetailJob::new(storage.clone(), source, StaticCardResolver::new())
            .run(id)
            .await
            .unwrap();
        let first_scraped = storage
            .get_commander(id)
            .await
            .unwrap()
            .unwrap()
            .last_scraped_at;

        // Second scrape fails; nothing may change.
        let source = MockCommanderSource::new().with_decklist_failure(url, "FetchError");
        let err = DetailJob::new(storage.clone(), source, StaticCardResolver::new())
            .run(id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "FetchError");

        let commander = storage.get_commander(id).await.unwrap().unwrap();
        assert_eq!(commander.last_scraped_at, first_scraped);
        assert_eq!(storage.get_decklist(id).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_failing_job_does_not_affect_siblings() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let a = seeded_commander(&storage, "Atraxa").await;
        let b = seeded_commander(&storage, "Edgar").await;
        let c = seeded_commander(&storage, "Ur-Dragon").await;

        let source = MockCommanderSource::new()
            .with_decklist(
                "https://edhrec.com/commanders/atraxa",
                vec![commander_entry("Atraxa")],
            )
            .with_decklist_failure("https://edhrec.com/commanders/edgar", "FetchError")
            .with_decklist(
                "https://edhrec.com/commanders/ur-dragon",
                vec![commander_entry("Ur-Dragon")],
            );
        let resolver = StaticCardResolver::new();
        let job = DetailJob::new(storage.clone(), source, resolver);

        assert!(job.run(a).await.is_ok());
        assert!(job.run(b).await.is_err());
        assert!(job.run(c).await.is_ok());

        assert_eq!(storage.decklist_count(), 2);
        assert!(storage.get_decklist(b).await.unwrap().is_none());
        let edgar = storage.get_commander(b).await.unwrap().unwrap();
        assert!(edgar.last_scraped_at.is_none());
    }

    #[tokio::test]
    async fn rerun_replaces_decklist_wholesale() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let id = seeded_commander(&storage, "Atraxa").await;
        let url = "https://edhrec.com/commanders/atraxa";

        let source = MockCommanderSource::new().with_decklist(
            url,
            vec![
                commander_entry("Atraxa"),
                card_entry("Inexorable Tide", "Top Cards"),
            ],
        );
        let job = DetailJob::new(storage.clone(), source, StaticCardResolver::new());
        job.run(id).await.unwrap();
        let first_scraped = storage
            .get_commander(id)
            .await
            .unwrap()
            .unwrap()
            .last_scraped_at
            .unwrap();

        let source = MockCommanderSource::new()
            .with_decklist(url, vec![commander_entry("Atraxa")]);
        let job = DetailJob::new(storage.clone(), source, StaticCardResolver::new());
        job.run(id).await.unwrap();

        let decklist = storage.get_decklist(id).await.unwrap().unwrap();
        assert_eq!(decklist.len(), 1);
        assert_eq!(storage.decklist_count(), 1);
        let rescraped = storage
            .get_commander(id)
            .await
            .unwrap()
            .unwrap()
            .last_scraped_at
            .unwrap();
        assert!(rescraped >= first_scraped);
    }

    #[tokio::test]
    async fn resolver_errors_leave_external_id_null() {
        let storage = Arc::new(InMemoryScraperStorage::new());
        let id = seeded_commander(&storage, "Atraxa").await;
        let url = "https://edhrec.com/commanders/atraxa";

        let source = MockCommanderSource::new().with_decklist(
            url,
            vec![commander_entry("Atraxa"), card_entry("Unknown Card", "Lands")],
        );
        let resolver = StaticCardResolver::new().with_failure("Unknown Card");
        let job = DetailJob::new(storage.clone(), source, resolver);

        job.run(id).await.unwrap();
        let decklist = storage.get_decklist(id).await.unwrap().unwrap();
        assert_eq!(decklist[1].external_card_id, None);
    }
}
