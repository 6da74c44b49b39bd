// src/web/search.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("search API key missing")]
    MissingApiKey,
}

/// Query text in, candidate source URLs out.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
}

/// Web search via the Brave Search API.
pub struct BraveSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl BraveSearchClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.search_api_url.clone(),
            api_key,
        })
    }

    pub fn from_env(config: &Config) -> Option<Self> {
        let api_key = std::env::var("BRAVE_SEARCH_API_KEY").ok()?;
        Self::new(config, api_key).ok()
    }
}

/// Stand-in searcher for when no search API key is configured. Research
/// still runs, finds no sources, and reports that honestly.
pub struct OfflineSearcher;

#[async_trait]
impl WebSearcher for OfflineSearcher {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<String>, SearchError> {
        debug!(query, "no search backend configured");
        Ok(Vec::new())
    }
}

#[async_trait]
impl WebSearcher for BraveSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        debug!(query, "web search");
        let response = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", &limit.to_string())])
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, body });
        }

        let parsed: BraveSearchResponse = response.json().await?;
        let urls = parsed
            .web
            .map(|w| w.results.into_iter().map(|r| r.url).collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(urls.into_iter().take(limit).collect())
    }
}
