// tests/common/mod.rs
// Shared fixtures: in-memory store, deterministic stub clients with call
// counters, and a fully wired orchestrator.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;

use provider_research::config::Config;
use provider_research::dedupe::{AddressPolicy, IdentityResolver};
use provider_research::interpreter::QueryInterpreter;
use provider_research::llm::{CompletionClient, LlmError};
use provider_research::matcher::SemanticMatcher;
use provider_research::orchestrator::Orchestrator;
use provider_research::research::{RegistryClient, RegistryRecord, WebResearcher};
use provider_research::store::{NewProvider, ProviderStore};
use provider_research::web::{FetchError, SearchError, WebFetcher, WebSearcher};

pub async fn memory_store() -> Arc<ProviderStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");

    let store = ProviderStore::new(pool);
    store.init_schema().await.expect("schema");
    Arc::new(store)
}

/// Config with fixed thresholds, independent of the environment.
pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        sqlite_max_connections: 1,
        anthropic_base_url: "http://localhost".to_string(),
        model: "test-model".to_string(),
        model_max_tokens: 1000,
        model_timeout: 5,
        fetch_timeout: 5,
        fetch_max_retries: 1,
        fetch_delay_ms: 1,
        research_max_urls: 5,
        search_api_url: "http://localhost".to_string(),
        registry_api_url: "http://localhost".to_string(),
        store_confidence_threshold: 0.85,
        semantic_confidence_threshold: 0.8,
        semantic_match_threshold: 0.7,
        semantic_candidate_pool: 50,
        search_default_limit: 10,
        list_limit: 100,
        log_level: "info".to_string(),
    }
}

pub fn provider(name: &str, city: &str, state: &str) -> NewProvider {
    NewProvider {
        legal_name: name.to_string(),
        address_city: Some(city.to_string()),
        address_state: Some(state.to_string()),
        confidence_score: 0.8,
        ..NewProvider::default()
    }
}

/// Completion client that replays a fixed script of responses.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::Malformed("script exhausted".to_string()))
    }
}

/// Searcher returning a fixed URL list, counting invocations.
pub struct StubSearcher {
    urls: Vec<String>,
    calls: AtomicUsize,
}

impl StubSearcher {
    pub fn new(urls: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            urls: urls.into_iter().map(str::to_string).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearcher for StubSearcher {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.urls.iter().take(limit).cloned().collect())
    }
}

/// Fetcher serving canned pages; unknown URLs 404.
pub struct StubFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(pages: Vec<(&str, &str)>) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .into_iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

/// Registry returning a fixed record set.
pub struct StubRegistry {
    pub records: Vec<RegistryRecord>,
}

impl StubRegistry {
    pub fn new(records: Vec<RegistryRecord>) -> Arc<Self> {
        Arc::new(Self { records })
    }
}

#[async_trait]
impl RegistryClient for StubRegistry {
    async fn lookup(
        &self,
        _name: &str,
        _state: Option<&str>,
    ) -> Result<Vec<RegistryRecord>, FetchError> {
        Ok(self.records.clone())
    }
}

pub fn registry_record(npi: &str, name: &str, city: &str, phone: Option<&str>) -> RegistryRecord {
    RegistryRecord {
        npi: npi.to_string(),
        legal_name: name.to_string(),
        address: None,
        city: Some(city.to_string()),
        state: Some("MA".to_string()),
        zip: None,
        phone: phone.map(str::to_string),
        status: Some("A".to_string()),
    }
}

/// Orchestrator wired entirely from stubs, no model client.
pub fn orchestrator(
    store: Arc<ProviderStore>,
    searcher: Arc<StubSearcher>,
    fetcher: Arc<StubFetcher>,
    auto_save: bool,
) -> Orchestrator {
    let config = test_config();
    let policy = AddressPolicy::SameBuildingIsSameEntity;

    let researcher = WebResearcher::new(
        None,
        searcher,
        fetcher,
        None,
        IdentityResolver::new(policy, None),
        config.research_max_urls,
    );

    Orchestrator::new(
        config,
        store,
        QueryInterpreter::rule_based(),
        SemanticMatcher::new(None),
        researcher,
        IdentityResolver::new(policy, None),
        auto_save,
    )
}
