//! EDHREC source client.
//!
//! Fetches two resources from the source's JSON page endpoints: the
//! ranked commander list and a single commander's card list. Every
//! network request consults the shared rate limiter first; parse and
//! transport problems surface as `ScrapeError::Fetch`.
//!
//! Responses are cached by URL so repeated fetches inside one process
//! don't burn rate-limit budget. A cache hit performs no network request
//! and therefore does not consult the limiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{ScrapeError, ScrapeResult};
use crate::rate_limiter::SourceRateLimiter;
use crate::types::{DeckEntry, RankedCommander};

/// Rate-limiter key for all EDHREC traffic.
pub const SOURCE_KEY: &str = "edhrec";

/// Category assigned to the commander's own entry in a decklist.
pub const COMMANDER_CATEGORY: &str = "commander";

/// External source of ranked commanders and their decklists.
#[async_trait]
pub trait CommanderSource: Send + Sync {
    /// Ordered ranked list; rank is 1-based and contiguous.
    async fn fetch_top_commanders(&self) -> ScrapeResult<Vec<RankedCommander>>;

    /// Ordered card entries for one commander page; the first entry is
    /// the commander itself.
    async fn fetch_commander_decklist(&self, url: &str) -> ScrapeResult<Vec<DeckEntry>>;

    /// Drop the internal response cache. No effect on rate-limiter state.
    fn clear_cache(&self);
}

#[async_trait]
impl<T: CommanderSource + ?Sized> CommanderSource for Arc<T> {
    async fn fetch_top_commanders(&self) -> ScrapeResult<Vec<RankedCommander>> {
        (**self).fetch_top_commanders().await
    }

    async fn fetch_commander_decklist(&self, url: &str) -> ScrapeResult<Vec<DeckEntry>> {
        (**self).fetch_commander_decklist(url).await
    }

    fn clear_cache(&self) {
        (**self).clear_cache()
    }
}

/// Reqwest-backed EDHREC client.
pub struct EdhrecClient {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<SourceRateLimiter>,
    cache: Mutex<HashMap<String, String>>,
}

impl EdhrecClient {
    /// Build a client against `base_url` (no trailing slash).
    ///
    /// Uses a browser-like User-Agent; the source blocks obvious bots.
    pub fn new(
        base_url: impl Into<String>,
        rate_limiter: Arc<SourceRateLimiter>,
    ) -> anyhow::Result<Self> {
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "application/json,text/html;q=0.9,*/*;q=0.8".parse()?,
        );
        headers.insert(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5".parse()?);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch a body, serving from cache when possible.
    async fn fetch_body(&self, url: &str) -> ScrapeResult<String> {
        if let Some(body) = self.cache.lock().expect("cache mutex poisoned").get(url) {
            tracing::debug!(url, "serving response from cache");
            return Ok(body.clone());
        }

        self.rate_limiter.check(SOURCE_KEY)?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::fetch(url, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::fetch(url, format!("failed to read body: {e}")))?;

        self.cache
            .lock()
            .expect("cache mutex poisoned")
            .insert(url.to_string(), body.clone());

        Ok(body)
    }

    fn top_commanders_endpoint(&self) -> String {
        format!("{}/pages/commanders/year.json", self.base_url)
    }

    /// Map a commander page URL to its JSON endpoint.
    ///
    /// `https://edhrec.com/commanders/<slug>` →
    /// `<base>/pages/commanders/<slug>.json`.
    fn decklist_endpoint(&self, page_url: &str) -> ScrapeResult<String> {
        let parsed = Url::parse(page_url)
            .map_err(|e| ScrapeError::fetch(page_url, format!("invalid commander url: {e}")))?;
        let slug = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .ok_or_else(|| ScrapeError::fetch(page_url, "commander url has no slug"))?;
        Ok(format!("{}/pages/commanders/{}.json", self.base_url, slug))
    }
}

#[async_trait]
impl CommanderSource for EdhrecClient {
    async fn fetch_top_commanders(&self) -> ScrapeResult<Vec<RankedCommander>> {
        let endpoint = self.top_commanders_endpoint();
        let body = self.fetch_body(&endpoint).await?;
        let commanders = parse_top_commanders(&body, &self.base_url, &endpoint)?;
        tracing::info!(count = commanders.len(), "fetched top commanders");
        Ok(commanders)
    }

    async fn fetch_commander_decklist(&self, url: &str) -> ScrapeResult<Vec<DeckEntry>> {
        let endpoint = self.decklist_endpoint(url)?;
        let body = self.fetch_body(&endpoint).await?;
        let entries = parse_decklist(&body, &endpoint)?;
        tracing::info!(url, cards = entries.len(), "fetched commander decklist");
        Ok(entries)
    }

    fn clear_cache(&self) {
        self.cache.lock().expect("cache mutex poisoned").clear();
    }
}

// ============================================================================
// WIRE SHAPES (source JSON pages)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SourcePage {
    container: Container,
}

#[derive(Debug, Deserialize)]
struct Container {
    json_dict: JsonDict,
}

#[derive(Debug, Deserialize)]
struct JsonDict {
    #[serde(default)]
    card: Option<CardView>,
    #[serde(default)]
    cardlists: Vec<CardList>,
}

#[derive(Debug, Deserialize)]
struct CardList {
    #[serde(default)]
    tag: String,
    #[serde(default)]
    header: String,
    #[serde(default)]
    cardviews: Vec<CardView>,
}

impl CardList {
    /// Human-readable category, falling back to the machine tag.
    fn category(&self) -> &str {
        if !self.header.is_empty() {
            &self.header
        } else {
            &self.tag
        }
    }
}

#[derive(Debug, Deserialize)]
struct CardView {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sanitized: Option<String>,
}

impl CardView {
    /// Absolute page URL for this card's commander page.
    fn page_url(&self, base_url: &str) -> Option<String> {
        if let Some(url) = &self.url {
            if url.starts_with("http") {
                return Some(url.clone());
            }
            return Some(format!("{}{}", base_url, url));
        }
        self.sanitized
            .as_ref()
            .map(|slug| format!("{}/commanders/{}", base_url, slug))
    }
}

/// Parse the ranked commander list page. Ranks are assigned from list
/// order, 1-based and contiguous.
fn parse_top_commanders(
    body: &str,
    base_url: &str,
    endpoint: &str,
) -> ScrapeResult<Vec<RankedCommander>> {
    let page: SourcePage = serde_json::from_str(body)
        .map_err(|e| ScrapeError::fetch(endpoint, format!("invalid commander list: {e}")))?;

    let mut commanders = Vec::new();
    for cardlist in &page.container.json_dict.cardlists {
        for view in &cardlist.cardviews {
            let url = view.page_url(base_url).ok_or_else(|| {
                ScrapeError::fetch(endpoint, format!("commander '{}' has no url", view.name))
            })?;
            commanders.push(RankedCommander {
                name: view.name.clone(),
                rank: commanders.len() as i32 + 1,
                url,
            });
        }
    }

    if commanders.is_empty() {
        return Err(ScrapeError::fetch(endpoint, "no commanders in response"));
    }
    Ok(commanders)
}

/// Parse a commander page into ordered deck entries. The commander itself
/// is the first entry and the only one with `is_commander = true`.
fn parse_decklist(body: &str, endpoint: &str) -> ScrapeResult<Vec<DeckEntry>> {
    let page: SourcePage = serde_json::from_str(body)
        .map_err(|e| ScrapeError::fetch(endpoint, format!("invalid commander page: {e}")))?;

    let dict = page.container.json_dict;
    let commander = dict
        .card
        .ok_or_else(|| ScrapeError::fetch(endpoint, "commander card missing from page"))?;

    let mut entries = vec![DeckEntry {
        card_name: commander.name,
        category: COMMANDER_CATEGORY.to_string(),
        is_commander: true,
        external_card_id: None,
    }];

    for cardlist in &dict.cardlists {
        for view in &cardlist.cardviews {
            entries.push(DeckEntry {
                card_name: view.name.clone(),
                category: cardlist.category().to_string(),
                is_commander: false,
                external_card_id: None,
            });
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMANDERS_JSON: &str = r#"{
        "container": {
            "json_dict": {
                "cardlists": [
                    {
                        "tag": "topcommanders",
                        "header": "Top Commanders",
                        "cardviews": [
                            {"name": "Atraxa, Praetors' Voice", "sanitized": "atraxa-praetors-voice", "url": "/commanders/atraxa-praetors-voice"},
                            {"name": "Edgar Markov", "sanitized": "edgar-markov", "url": "/commanders/edgar-markov"},
                            {"name": "The Ur-Dragon", "sanitized": "the-ur-dragon", "url": "/commanders/the-ur-dragon"}
                        ]
                    }
                ]
            }
        }
    }"#;

    const DECKLIST_JSON: &str = r#"{
        "container": {
            "json_dict": {
                "card": {"name": "Atraxa, Praetors' Voice", "sanitized": "atraxa-praetors-voice"},
                "cardlists": [
                    {
                        "tag": "highsynergycards",
                        "header": "High Synergy Cards",
                        "cardviews": [
                            {"name": "Deepglow Skate", "sanitized": "deepglow-skate"},
                            {"name": "Inexorable Tide", "sanitized": "inexorable-tide"}
                        ]
                    },
                    {
                        "tag": "utilitylands",
                        "header": "",
                        "cardviews": [
                            {"name": "Karn's Bastion", "sanitized": "karns-bastion"}
                        ]
                    }
                ]
            }
        }
    }"#;

    #[test]
    fn parses_ranked_commanders_with_contiguous_ranks() {
        let commanders =
            parse_top_commanders(COMMANDERS_JSON, "https://edhrec.com", "test").unwrap();
        assert_eq!(commanders.len(), 3);
        assert_eq!(
            commanders[0],
            RankedCommander {
                name: "Atraxa, Praetors' Voice".to_string(),
                rank: 1,
                url: "https://edhrec.com/commanders/atraxa-praetors-voice".to_string(),
            }
        );
        let ranks: Vec<i32> = commanders.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn parses_decklist_with_commander_first() {
        let entries = parse_decklist(DECKLIST_JSON, "test").unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].is_commander);
        assert_eq!(entries[0].card_name, "Atraxa, Praetors' Voice");
        assert_eq!(entries[0].category, COMMANDER_CATEGORY);

        // exactly one commander entry
        assert_eq!(entries.iter().filter(|e| e.is_commander).count(), 1);

        assert_eq!(entries[1].category, "High Synergy Cards");
        // empty header falls back to the tag
        assert_eq!(entries[3].category, "utilitylands");
    }

    #[test]
    fn malformed_body_is_a_fetch_error() {
        let err = parse_top_commanders("not json", "https://edhrec.com", "test").unwrap_err();
        assert_eq!(err.kind(), "FetchError");

        let err = parse_decklist(r#"{"container":{"json_dict":{}}}"#, "test").unwrap_err();
        assert_eq!(err.kind(), "FetchError");
    }

    #[test]
    fn empty_commander_list_is_a_fetch_error() {
        let body = r#"{"container":{"json_dict":{"cardlists":[]}}}"#;
        let err = parse_top_commanders(body, "https://edhrec.com", "test").unwrap_err();
        assert_eq!(err.kind(), "FetchError");
    }

    #[test]
    fn decklist_endpoint_derived_from_page_url() {
        let client = EdhrecClient::new(
            "https://edhrec.com",
            Arc::new(SourceRateLimiter::default()),
        )
        .unwrap();
        assert_eq!(
            client
                .decklist_endpoint("https://edhrec.com/commanders/edgar-markov")
                .unwrap(),
            "https://edhrec.com/pages/commanders/edgar-markov.json"
        );
        assert!(client.decklist_endpoint("not a url").is_err());
    }

    #[tokio::test]
    async fn cache_hit_consumes_no_rate_limit_budget() {
        let limiter = Arc::new(SourceRateLimiter::default());
        let client = EdhrecClient::new("https://edhrec.com", limiter.clone()).unwrap();
        client
            .cache
            .lock()
            .unwrap()
            .insert(client.top_commanders_endpoint(), COMMANDERS_JSON.to_string());

        let commanders = client.fetch_top_commanders().await.unwrap();
        assert_eq!(commanders.len(), 3);
        assert_eq!(limiter.in_flight(SOURCE_KEY), 0);
    }

    #[test]
    fn clear_cache_leaves_rate_limiter_untouched() {
        let limiter = Arc::new(SourceRateLimiter::default());
        let client = EdhrecClient::new("https://edhrec.com", limiter.clone()).unwrap();
        limiter.check(SOURCE_KEY).unwrap();
        client.clear_cache();
        assert_eq!(limiter.in_flight(SOURCE_KEY), 1);
    }
}
