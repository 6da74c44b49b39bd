// src/orchestrator/mod.rs
// Sequences interpretation, store lookup, semantic matching, and web
// research into one call. Cheaper stages short-circuit the expensive ones;
// stage failures become warnings on a uniform result, never a crash.

pub mod types;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dedupe::{IdentityResolver, IdentityView};
use crate::interpreter::{Intent, ParsedQuery, QueryInterpreter};
use crate::matcher::SemanticMatcher;
use crate::research::{CandidateLocation, ResearchFindings, WebResearcher};
use crate::session::Session;
use crate::store::{
    ChangeDetails, ChangeKind, NewProvider, ProviderStore, SearchHit, SearchLogEntry, SearchQuery,
};

pub use types::{CascadeStage, OrchestrationResult, TokenUsage};

// Per-stage cost estimates, mirrored into every result's token counter.
const INTERPRETER_COST: u64 = 800;
const MATCHER_COST: u64 = 500;
const RESEARCHER_COST: u64 = 5000;

pub struct Orchestrator {
    config: Config,
    store: Arc<ProviderStore>,
    interpreter: QueryInterpreter,
    matcher: SemanticMatcher,
    researcher: WebResearcher,
    resolver: IdentityResolver,
    auto_save: bool,
}

struct RunState {
    started: Instant,
    steps: Vec<String>,
    warnings: Vec<String>,
    usage: TokenUsage,
}

impl RunState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            steps: Vec::new(),
            warnings: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    fn step(&mut self, description: impl Into<String>) {
        self.steps.push(description.into());
    }
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Arc<ProviderStore>,
        interpreter: QueryInterpreter,
        matcher: SemanticMatcher,
        researcher: WebResearcher,
        resolver: IdentityResolver,
        auto_save: bool,
    ) -> Self {
        Self {
            config,
            store,
            interpreter,
            matcher,
            researcher,
            resolver,
            auto_save,
        }
    }

    /// Process one query. Always returns a structured result; internal
    /// failures surface in `warnings` with a clarification question, never
    /// as an error to the caller.
    pub async fn process(&self, query: &str, session: &mut Session) -> OrchestrationResult {
        let mut run = RunState::new();
        session.push_user_turn(query);

        run.step("Interpreting query");
        let parsed = self.interpreter.interpret(query, session).await;
        run.usage.interpreter += INTERPRETER_COST;

        if let Some(question) = &parsed.clarification_needed {
            let question = question.clone();
            return self.build(
                &mut run,
                false,
                CascadeStage::Clarification,
                parsed.intent,
                Vec::new(),
                "Need clarification before proceeding".to_string(),
                parsed.confidence,
                Some(question),
            );
        }

        let intent = parsed.intent;
        let outcome = match intent {
            Intent::Search | Intent::Research | Intent::Verify | Intent::Relate => {
                self.handle_search(&parsed, &mut run).await
            }
            Intent::Add => self.handle_add(&parsed, &mut run).await,
            Intent::Compare => self.handle_compare(&parsed, &mut run).await,
            Intent::List => self.handle_list(&parsed, &mut run).await,
            Intent::Update | Intent::Delete => Ok(self.build(
                &mut run,
                false,
                CascadeStage::Clarification,
                intent,
                Vec::new(),
                "Record updates and deletions are administrative operations; \
                 use the management commands instead"
                    .to_string(),
                0.0,
                None,
            )),
            Intent::Clarify => Ok(self.build(
                &mut run,
                false,
                CascadeStage::Clarification,
                intent,
                Vec::new(),
                "Need clarification before proceeding".to_string(),
                parsed.confidence,
                Some("Could you say more about what you are looking for?".to_string()),
            )),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "query processing failed");
                run.warnings.push(e.to_string());
                self.build(
                    &mut run,
                    false,
                    CascadeStage::Clarification,
                    intent,
                    Vec::new(),
                    format!("Error processing query: {e}"),
                    0.0,
                    Some("Could you rephrase or narrow the query?".to_string()),
                )
            }
        };

        self.update_session(session, &result);
        result
    }

    async fn handle_search(
        &self,
        parsed: &ParsedQuery,
        run: &mut RunState,
    ) -> Result<OrchestrationResult> {
        let Some(mention) = parsed.providers.first() else {
            run.warnings.push("no provider specified in query".to_string());
            return Ok(self.build(
                run,
                false,
                CascadeStage::Clarification,
                parsed.intent,
                Vec::new(),
                "Could not identify which provider to search for".to_string(),
                0.0,
                Some("Which provider are you looking for?".to_string()),
            ));
        };
        let name = mention.name.clone();

        // Tier 1: the store. Free, and a confident hit ends the run.
        run.step(format!("Searching database for '{name}'"));
        let store_query = SearchQuery {
            text: Some(name.clone()),
            state: parsed.filters.state.clone(),
            city: parsed.filters.city.clone(),
            npi: None,
            phone: None,
            parent_organization: parsed.filters.parent_organization.clone(),
            fuzzy: true,
            limit: self.config.search_default_limit,
        };
        let hits = self.store.search(&store_query).await?;
        self.log_lookup(&name, parsed, hits.first()).await;

        if let Some(top) = hits.first() {
            if top.confidence >= self.config.store_confidence_threshold {
                let confidence = top.confidence;
                let providers = provider_values(&hits);
                let message = format!("Found {} provider(s) in database", providers.len());
                return Ok(self.build(
                    run,
                    true,
                    CascadeStage::DatabaseHit,
                    parsed.intent,
                    providers,
                    message,
                    confidence,
                    None,
                ));
            }
        }

        // Tier 2: semantic matching over whatever candidates we have.
        run.step("No high-confidence database match, trying semantic matching");
        let mut candidates: Vec<_> = hits.iter().map(|h| h.provider.clone()).collect();
        if candidates.is_empty() {
            let pool_query = SearchQuery {
                state: parsed.filters.state.clone(),
                limit: self.config.semantic_candidate_pool,
                ..SearchQuery::default()
            };
            candidates = self
                .store
                .list_filtered(&pool_query)
                .await?
                .into_iter()
                .map(|h| h.provider)
                .collect();
        }

        if !candidates.is_empty() {
            run.usage.matcher += MATCHER_COST;
            let matches = self
                .matcher
                .r#match(
                    &name,
                    &candidates,
                    Some(&parsed.filters),
                    self.config.semantic_match_threshold,
                )
                .await;

            if let Some(top) = matches.first() {
                if top.confidence >= self.config.semantic_confidence_threshold {
                    let confidence = top.confidence;
                    let mut providers = Vec::new();
                    for m in &matches {
                        match self.store.get(m.provider_id).await? {
                            Some(record) => providers.push(to_value(&record)),
                            None => providers.push(json!({
                                "id": m.provider_id,
                                "legal_name": m.provider_name,
                            })),
                        }
                    }
                    let message =
                        format!("Found {} provider(s) via semantic matching", providers.len());
                    return Ok(self.build(
                        run,
                        true,
                        CascadeStage::SemanticMatch,
                        parsed.intent,
                        providers,
                        message,
                        confidence,
                        None,
                    ));
                }
            }
        }

        // Tier 3: web research. The expensive last resort.
        run.step("No database or semantic match, conducting web research");
        run.usage.researcher += RESEARCHER_COST;
        let location = mention
            .location
            .clone()
            .or_else(|| parsed.filters.state.clone());
        let findings = self.researcher.research(&name, location.as_deref()).await;
        run.warnings.extend(findings.warnings.iter().cloned());

        if findings.locations.is_empty() {
            let message = format!("Could not find '{name}' in database or web research");
            return Ok(self.build(
                run,
                false,
                CascadeStage::WebResearch,
                parsed.intent,
                Vec::new(),
                message,
                0.0,
                None,
            ));
        }

        let saved = if self.auto_save {
            self.save_findings(&findings, run).await?
        } else {
            0
        };

        let providers: Vec<Value> = findings
            .locations
            .iter()
            .map(|l| to_value(l))
            .collect();
        let mut message = format!("Found {} location(s) via web research", providers.len());
        if self.auto_save {
            message.push_str(&format!(" ({saved} saved to database)"));
        }

        Ok(self.build(
            run,
            true,
            CascadeStage::WebResearch,
            parsed.intent,
            providers,
            message,
            findings.confidence,
            None,
        ))
    }

    /// Persist researched locations that are not duplicates of stored
    /// records, along with any recovered historical events.
    async fn save_findings(
        &self,
        findings: &ResearchFindings,
        run: &mut RunState,
    ) -> Result<usize> {
        let mut saved = 0usize;
        // Research history describes the provider as a whole; record it on
        // the first saved location rather than duplicating it onto each.
        let mut history_attached = false;

        for location in &findings.locations {
            if let Some(existing_id) = self.find_store_duplicate(location).await? {
                info!(%existing_id, "skipping duplicate researched location");
                continue;
            }

            let new_provider = candidate_to_provider(location, findings.confidence);
            let id = match self.store.add(&new_provider).await {
                Ok(id) => id,
                Err(e) => {
                    run.warnings
                        .push(format!("could not save researched location: {e}"));
                    continue;
                }
            };
            saved += 1;

            if history_attached {
                continue;
            }
            history_attached = true;
            for event in &findings.events {
                let Some(previous) = &event.previous_value else {
                    continue;
                };
                let field_name = if event.event_kind.is_ownership() {
                    "parent_organization"
                } else {
                    "legal_name"
                };
                let details = ChangeDetails {
                    change_kind: event_change_kind(event.event_kind),
                    effective_date: event.event_date.as_deref().and_then(parse_effective_date),
                    source: "web_research".to_string(),
                    notes: Some(event.description.clone()),
                    recorded_by: None,
                };
                if let Err(e) = self
                    .store
                    .append_history(
                        id,
                        field_name,
                        Some(previous),
                        event.new_value.as_deref(),
                        &details,
                    )
                    .await
                {
                    run.warnings.push(format!("could not record history: {e}"));
                }
            }
        }

        Ok(saved)
    }

    async fn find_store_duplicate(&self, location: &CandidateLocation) -> Result<Option<Uuid>> {
        let probe = SearchQuery {
            text: location.name.clone(),
            npi: location.npi.clone(),
            phone: location.phone.clone(),
            state: location.state.clone(),
            fuzzy: false,
            limit: 5,
            ..SearchQuery::default()
        };

        let view = IdentityView::from(location);
        for hit in self.store.search(&probe).await? {
            let verdict = self
                .resolver
                .resolve(&view, &(&hit.provider).into(), Some(hit.provider.id))
                .await;
            if verdict.is_duplicate {
                return Ok(verdict.matching_id);
            }
        }
        Ok(None)
    }

    async fn handle_add(
        &self,
        parsed: &ParsedQuery,
        run: &mut RunState,
    ) -> Result<OrchestrationResult> {
        let Some(mention) = parsed.providers.first() else {
            return Ok(self.build(
                run,
                false,
                CascadeStage::Clarification,
                parsed.intent,
                Vec::new(),
                "No provider data specified to add".to_string(),
                0.0,
                Some("What provider information should I add?".to_string()),
            ));
        };
        run.step(format!("Adding provider '{}'", mention.name));

        let candidate = CandidateLocation {
            name: Some(mention.name.clone()),
            city: parsed.filters.city.clone(),
            state: parsed.filters.state.clone(),
            ..CandidateLocation::default()
        };

        if let Some(existing_id) = self.find_store_duplicate(&candidate).await? {
            let existing = self.store.get(existing_id).await?;
            let providers = existing.iter().map(to_value).collect();
            return Ok(self.build(
                run,
                false,
                CascadeStage::DatabaseHit,
                parsed.intent,
                providers,
                "Provider already exists in database".to_string(),
                0.95,
                None,
            ));
        }

        let new_provider = candidate_to_provider(&candidate, 0.95);
        let id = self.store.add(&new_provider).await?;

        let mut value = to_value(&candidate);
        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), json!(id));
        }

        Ok(self.build(
            run,
            true,
            CascadeStage::DatabaseHit,
            parsed.intent,
            vec![value],
            format!("Added provider to database (ID: {id})"),
            0.95,
            None,
        ))
    }

    async fn handle_compare(
        &self,
        parsed: &ParsedQuery,
        run: &mut RunState,
    ) -> Result<OrchestrationResult> {
        if parsed.providers.len() < 2 {
            return Ok(self.build(
                run,
                false,
                CascadeStage::Clarification,
                parsed.intent,
                Vec::new(),
                "Need at least 2 providers to compare".to_string(),
                0.0,
                Some("Which providers would you like to compare?".to_string()),
            ));
        }

        run.step(format!("Comparing {} providers", parsed.providers.len()));
        let mut groups = Vec::new();
        for mention in parsed.providers.iter().take(5) {
            let hits = self
                .store
                .search(&SearchQuery {
                    text: Some(mention.name.clone()),
                    state: parsed.filters.state.clone(),
                    limit: self.config.search_default_limit,
                    ..SearchQuery::default()
                })
                .await?;

            groups.push(json!({
                "query": mention.name,
                "results": provider_values(&hits),
            }));
        }

        Ok(self.build(
            run,
            true,
            CascadeStage::MultiStep,
            parsed.intent,
            groups,
            format!("Comparison results for {} providers", parsed.providers.len()),
            0.85,
            None,
        ))
    }

    async fn handle_list(
        &self,
        parsed: &ParsedQuery,
        run: &mut RunState,
    ) -> Result<OrchestrationResult> {
        run.step("Listing providers");
        let hits = self
            .store
            .search(&SearchQuery {
                state: parsed.filters.state.clone(),
                city: parsed.filters.city.clone(),
                parent_organization: parsed.filters.parent_organization.clone(),
                limit: self.config.list_limit,
                ..SearchQuery::default()
            })
            .await?;

        let providers = provider_values(&hits);
        Ok(self.build(
            run,
            true,
            CascadeStage::DatabaseHit,
            parsed.intent,
            providers.clone(),
            format!("Found {} providers matching filters", providers.len()),
            0.9,
            None,
        ))
    }

    async fn log_lookup(&self, name: &str, parsed: &ParsedQuery, top: Option<&SearchHit>) {
        let location = match (&parsed.filters.city, &parsed.filters.state) {
            (Some(city), Some(state)) => Some(format!("{city}, {state}")),
            (Some(city), None) => Some(city.clone()),
            (None, Some(state)) => Some(state.clone()),
            (None, None) => None,
        };

        let entry = SearchLogEntry {
            query: name.to_string(),
            location,
            match_found: top.is_some(),
            match_kind: top.map(|h| h.match_kind),
            match_score: top.map(|h| h.match_score),
            provider_id: top.map(|h| h.provider.id),
        };

        // Analytics only; a logging failure must not fail the lookup.
        if let Err(e) = self.store.log_search(&entry).await {
            warn!(error = %e, "search log write failed");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        run: &mut RunState,
        success: bool,
        stage: CascadeStage,
        intent: Intent,
        providers: Vec<Value>,
        message: String,
        confidence: f64,
        clarification_question: Option<String>,
    ) -> OrchestrationResult {
        OrchestrationResult {
            success,
            stage,
            intent,
            providers,
            message,
            confidence,
            token_usage: run.usage,
            execution_time_ms: run.started.elapsed().as_millis() as u64,
            steps_executed: std::mem::take(&mut run.steps),
            warnings: std::mem::take(&mut run.warnings),
            clarification_question,
        }
    }

    fn update_session(&self, session: &mut Session, result: &OrchestrationResult) {
        if result.success {
            if let Some(first) = result.providers.first() {
                session.set_last_result(first.clone());
            }
        }

        // Name the top results in the assistant turn so later pronouns
        // ("their other locations") can resolve against it.
        let names: Vec<&str> = result
            .providers
            .iter()
            .filter_map(|p| {
                p.get("legal_name")
                    .or_else(|| p.get("name"))
                    .and_then(Value::as_str)
            })
            .take(3)
            .collect();
        let turn = if names.is_empty() {
            result.message.clone()
        } else {
            format!("{}: {}", result.message, names.join(", "))
        };
        session.push_assistant_turn(turn);
    }
}

fn provider_values(hits: &[SearchHit]) -> Vec<Value> {
    hits.iter().map(|h| to_value(&h.provider)).collect()
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn candidate_to_provider(location: &CandidateLocation, confidence: f64) -> NewProvider {
    NewProvider {
        npi: location.npi.clone(),
        legal_name: location
            .name
            .clone()
            .unwrap_or_else(|| "Unknown provider".to_string()),
        dba_names: location.dba_names.clone(),
        address_full: location.address.clone(),
        address_street: None,
        address_city: location.city.clone(),
        address_state: location.state.clone(),
        address_zip: location.zip.clone(),
        phone: location.phone.clone(),
        fax: location.fax.clone(),
        email: None,
        website: location.website.clone(),
        parent_organization: location.parent_organization.clone(),
        real_estate_owner: None,
        franchise_status: location.franchise_id.is_some(),
        franchise_id: location.franchise_id.clone(),
        provider_type: None,
        confidence_score: confidence,
        data_source_urls: location.source_urls.clone(),
        raw_search_data: serde_json::to_value(location).ok(),
    }
}

fn event_change_kind(kind: crate::research::EventKind) -> ChangeKind {
    use crate::research::EventKind as E;
    match kind {
        E::OwnershipChange => ChangeKind::OwnershipChange,
        E::NameChange => ChangeKind::NameChange,
        E::Acquisition => ChangeKind::Acquisition,
        E::Merger => ChangeKind::Merger,
        E::FranchiseSale => ChangeKind::FranchiseSale,
        E::Rebranding => ChangeKind::Rebranding,
        E::Opening | E::Closure => ChangeKind::Other,
    }
}

/// Accept "YYYY-MM-DD" or a bare year from archival sources.
fn parse_effective_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    let year: i32 = raw.parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_dates_parse_loosely() {
        assert!(parse_effective_date("2020-06-15").is_some());
        assert!(parse_effective_date("2020").is_some());
        assert!(parse_effective_date("June 2020").is_none());
    }

    #[test]
    fn usage_totals() {
        let usage = TokenUsage {
            interpreter: 800,
            matcher: 500,
            researcher: 5000,
        };
        assert_eq!(usage.total(), 6300);
    }
}
