//! Scryfall-backed card identity resolver.
//!
//! The resolver is an independent collaborator with its own cache; the
//! detail job stores whatever id it returns and does not manage the
//! cache lifecycle.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::traits::CardResolver;

const DEFAULT_BASE_URL: &str = "https://api.scryfall.com";

pub struct ScryfallCardResolver {
    http: reqwest::Client,
    base_url: String,
    // Negative results are cached too; unknown names stay unknown.
    cache: RwLock<HashMap<String, Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct ScryfallCard {
    id: String,
}

impl ScryfallCardResolver {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create resolver HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: RwLock::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl CardResolver for ScryfallCardResolver {
    async fn resolve(&self, card_name: &str) -> Result<Option<String>> {
        if let Some(cached) = self
            .cache
            .read()
            .expect("resolver cache poisoned")
            .get(card_name)
        {
            return Ok(cached.clone());
        }

        let url = format!("{}/cards/named", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("exact", card_name)])
            .send()
            .await
            .with_context(|| format!("card lookup failed for '{card_name}'"))?;

        let resolved = match response.status() {
            status if status.is_success() => {
                let card: ScryfallCard = response
                    .json()
                    .await
                    .with_context(|| format!("invalid card payload for '{card_name}'"))?;
                Some(card.id)
            }
            reqwest::StatusCode::NOT_FOUND => None,
            status => bail!("card lookup for '{card_name}' returned HTTP {status}"),
        };

        self.cache
            .write()
            .expect("resolver cache poisoned")
            .insert(card_name.to_string(), resolved.clone());
        Ok(resolved)
    }
}
