// src/research/mod.rs
// Web research pipeline: search for sources, fetch and strip each one,
// extract current locations and historical data, dedupe, then validate
// against the external registry.

pub mod content;
pub mod extract;
pub mod registry;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::dedupe::IdentityResolver;
use crate::llm::CompletionClient;
use crate::store::validate::normalize_state;
use crate::web::{WebFetcher, WebSearcher};

pub use registry::{NpiRegistryClient, RegistryClient};
pub use types::{
    CandidateLocation, DataSource, EventConfidence, EventKind, HistoricalEvent,
    PreviousNameFinding, PreviousOwnerFinding, RegistryRecord, ResearchFindings,
};

pub struct WebResearcher {
    llm: Option<Arc<dyn CompletionClient>>,
    searcher: Arc<dyn WebSearcher>,
    fetcher: Arc<dyn WebFetcher>,
    registry: Option<Arc<dyn RegistryClient>>,
    resolver: IdentityResolver,
    max_urls: usize,
}

impl WebResearcher {
    pub fn new(
        llm: Option<Arc<dyn CompletionClient>>,
        searcher: Arc<dyn WebSearcher>,
        fetcher: Arc<dyn WebFetcher>,
        registry: Option<Arc<dyn RegistryClient>>,
        resolver: IdentityResolver,
        max_urls: usize,
    ) -> Self {
        Self {
            llm,
            searcher,
            fetcher,
            registry,
            resolver,
            max_urls,
        }
    }

    /// Run the full research pipeline for one provider. Individual source
    /// failures degrade to warnings; only a completely empty search ends
    /// the run early.
    pub async fn research(&self, provider_name: &str, location: Option<&str>) -> ResearchFindings {
        let mut warnings = Vec::new();
        let state = location.and_then(extract_state);

        let query = match location {
            Some(location) => format!("{provider_name} healthcare {location}"),
            None => format!("{provider_name} healthcare"),
        };

        let urls = match self.searcher.search(&query, self.max_urls).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, "web search failed");
                warnings.push(format!("web search failed: {e}"));
                return ResearchFindings::empty(provider_name, warnings);
            }
        };

        let urls: Vec<String> = urls
            .into_iter()
            .filter(|u| {
                let ok = Url::parse(u).is_ok_and(|p| matches!(p.scheme(), "http" | "https"));
                if !ok {
                    debug!(url = %u, "dropping unfetchable search result");
                }
                ok
            })
            .collect();

        if urls.is_empty() {
            warnings.push("no web results found".to_string());
            return ResearchFindings::empty(provider_name, warnings);
        }

        let mut locations: Vec<CandidateLocation> = Vec::new();
        let mut events: Vec<HistoricalEvent> = Vec::new();
        let mut fetched_urls: Vec<String> = Vec::new();

        for url in urls.iter().take(self.max_urls) {
            let body = match self.fetcher.fetch(url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url, error = %e, "skipping source");
                    warnings.push(format!("failed to fetch {url}: {e}"));
                    continue;
                }
            };
            fetched_urls.push(url.clone());

            let text = content::strip_markup(&body);
            if text.is_empty() {
                warnings.push(format!("no readable content at {url}"));
                continue;
            }

            let extracted = extract::extract_locations(
                self.llm.as_deref(),
                provider_name,
                state.as_deref(),
                &text,
                url,
            )
            .await;
            locations.extend(extracted);

            let history =
                extract::extract_history(self.llm.as_deref(), provider_name, &text, url).await;
            events.extend(history);
        }

        if locations.is_empty() {
            warnings.push("could not extract location data from web pages".to_string());
        }

        let (mut locations, removed) = self.resolver.dedupe_candidates(locations);
        if removed > 0 {
            info!(removed, "merged duplicate candidates");
        }

        let events = dedupe_events(events);
        let previous_names = previous_names_from(&events);
        let previous_owners = previous_owners_from(&events);

        let registry_records = self
            .validate_against_registry(provider_name, state.as_deref(), &mut locations, &mut warnings)
            .await;

        let confidence = research_confidence(&locations, &registry_records, &warnings);

        ResearchFindings {
            provider_name: provider_name.to_string(),
            locations,
            registry_records,
            previous_names,
            previous_owners,
            events,
            confidence,
            source_urls: fetched_urls,
            warnings,
            researched_at: Utc::now(),
        }
    }

    async fn validate_against_registry(
        &self,
        provider_name: &str,
        state: Option<&str>,
        locations: &mut [CandidateLocation],
        warnings: &mut Vec<String>,
    ) -> Vec<RegistryRecord> {
        let Some(registry) = &self.registry else {
            return Vec::new();
        };

        let records = match registry.lookup(provider_name, state).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "registry lookup failed");
                warnings.push(format!("registry lookup failed: {e}"));
                return Vec::new();
            }
        };

        let mut matched: Vec<RegistryRecord> = Vec::new();
        for location in locations.iter_mut() {
            if let Some(record) =
                registry::match_candidate(self.llm.as_deref(), location, &records).await
            {
                location.npi = Some(record.npi.clone());
                location.sources.push(DataSource::RegistryApi);
                if !matched.iter().any(|r| r.npi == record.npi) {
                    matched.push(record);
                }
            }
        }
        matched
    }
}

/// Additive research confidence: base 0.5, locations found +0.2, registry
/// match +0.2, clean run +0.1, capped at 1.0.
fn research_confidence(
    locations: &[CandidateLocation],
    registry_records: &[RegistryRecord],
    warnings: &[String],
) -> f64 {
    let mut score: f64 = 0.5;
    if !locations.is_empty() {
        score += 0.2;
    }
    if !registry_records.is_empty() {
        score += 0.2;
    }
    if warnings.is_empty() {
        score += 0.1;
    }
    score.min(1.0)
}

fn dedupe_events(events: Vec<HistoricalEvent>) -> Vec<HistoricalEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| {
            seen.insert(format!(
                "{:?}|{}|{}",
                e.event_kind,
                e.event_date.as_deref().unwrap_or(""),
                e.description
            ))
        })
        .collect()
}

fn previous_names_from(events: &[HistoricalEvent]) -> Vec<PreviousNameFinding> {
    events
        .iter()
        .filter(|e| e.event_kind.is_naming())
        .filter_map(|e| {
            Some(PreviousNameFinding {
                name: e.previous_value.clone()?,
                used_until: e.event_date.clone(),
                source_url: e.source_url.clone(),
            })
        })
        .collect()
}

fn previous_owners_from(events: &[HistoricalEvent]) -> Vec<PreviousOwnerFinding> {
    events
        .iter()
        .filter(|e| e.event_kind.is_ownership())
        .filter_map(|e| {
            Some(PreviousOwnerFinding {
                owner: e.previous_value.clone()?,
                owned_until: e.event_date.clone(),
                source_url: e.source_url.clone(),
            })
        })
        .collect()
}

/// Pull a state code out of a free-form location like "Boston, MA" or
/// "Massachusetts".
pub fn extract_state(location: &str) -> Option<String> {
    if let Some((_, tail)) = location.rsplit_once(',') {
        if let Some(code) = normalize_state(tail.trim()) {
            return Some(code.to_string());
        }
    }
    if let Some(code) = normalize_state(location.trim()) {
        return Some(code.to_string());
    }
    location
        .split_whitespace()
        .find_map(|token| normalize_state(token).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_extraction_handles_common_shapes() {
        assert_eq!(extract_state("Boston, MA"), Some("MA".to_string()));
        assert_eq!(extract_state("Massachusetts"), Some("MA".to_string()));
        assert_eq!(extract_state("somewhere TX else"), Some("TX".to_string()));
        assert_eq!(extract_state("nowhere"), None);
    }

    #[test]
    fn confidence_is_additive_and_capped() {
        let loc = CandidateLocation::default();
        let reg = RegistryRecord {
            npi: "1234567890".to_string(),
            legal_name: "X".to_string(),
            address: None,
            city: None,
            state: None,
            zip: None,
            phone: None,
            status: None,
        };

        assert_eq!(research_confidence(&[], &[], &["w".to_string()]), 0.5);
        assert!((research_confidence(&[loc.clone()], &[], &[]) - 0.8).abs() < 1e-9);
        assert_eq!(research_confidence(&[loc], &[reg], &[]), 1.0);
    }
}
