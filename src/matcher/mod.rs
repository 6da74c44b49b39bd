// src/matcher/mod.rs
// Semantic provider matching for queries that plain string search missed:
// abbreviations, parent/subsidiary naming, DBA aliases, regional variants.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::interpreter::QueryFilters;
use crate::llm::{CompletionClient, json};
use crate::store::ProviderRecord;

/// Why a semantic match was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticMatchKind {
    Exact,
    Abbreviation,
    ParentChild,
    Dba,
    Regional,
    Semantic,
}

impl SemanticMatchKind {
    fn parse(s: &str) -> Self {
        match s {
            "exact" => SemanticMatchKind::Exact,
            "abbreviation" => SemanticMatchKind::Abbreviation,
            "parent_child" => SemanticMatchKind::ParentChild,
            "dba" => SemanticMatchKind::Dba,
            "regional" => SemanticMatchKind::Regional,
            _ => SemanticMatchKind::Semantic,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticMatch {
    pub provider_id: Uuid,
    pub provider_name: String,
    pub match_score: f64,
    pub match_kind: SemanticMatchKind,
    pub reasoning: String,
    pub confidence: f64,
}

/// Known short forms, expanded as whole words before matching.
const KNOWN_ABBREVIATIONS: &[(&str, &str)] = &[
    ("ck", "comfort keepers"),
    ("va", "visiting angels"),
    ("hi", "home instead"),
    ("bs", "brightstar"),
    ("brightstar", "brightstar care"),
    ("gcpreit", "gcp reit"),
];

static ABBREVIATION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    KNOWN_ABBREVIATIONS
        .iter()
        .map(|(abbrev, full)| {
            let pattern = format!(r"\b{}\b", regex::escape(abbrev));
            (Regex::new(&pattern).expect("abbreviation pattern"), *full)
        })
        .collect()
});

const MATCH_MAX_TOKENS: u32 = 1500;
const PROMPT_CANDIDATE_CAP: usize = 20;

pub struct SemanticMatcher {
    client: Option<Arc<dyn CompletionClient>>,
}

impl SemanticMatcher {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    /// Rank candidates against the query. The deterministic pass runs
    /// first; the model pass only runs when it found nothing. An empty
    /// result is a valid outcome, never force a low-confidence match.
    pub async fn r#match(
        &self,
        query: &str,
        candidates: &[ProviderRecord],
        location_filter: Option<&QueryFilters>,
        threshold: f64,
    ) -> Vec<SemanticMatch> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let expanded = expand_abbreviations(query);
        let rule_matches = rule_based_matches(&expanded, candidates, location_filter);
        if !rule_matches.is_empty() {
            return filtered(rule_matches, threshold);
        }

        if let Some(client) = &self.client {
            let matches = self
                .model_matches(client.as_ref(), query, candidates, location_filter)
                .await;
            return filtered(matches, threshold);
        }

        Vec::new()
    }

    async fn model_matches(
        &self,
        client: &dyn CompletionClient,
        query: &str,
        candidates: &[ProviderRecord],
        location_filter: Option<&QueryFilters>,
    ) -> Vec<SemanticMatch> {
        let prompt = match_prompt(query, candidates, location_filter);

        let response = match client.complete(&prompt, MATCH_MAX_TOKENS).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "semantic match call failed");
                return Vec::new();
            }
        };

        match json::extract_array(&response) {
            Ok(items) => items.iter().filter_map(parse_match).collect(),
            Err(e) => {
                warn!(error = %e, "unparseable semantic matches");
                Vec::new()
            }
        }
    }
}

pub fn expand_abbreviations(query: &str) -> String {
    let mut expanded = query.to_lowercase();
    for (pattern, full) in ABBREVIATION_PATTERNS.iter() {
        if pattern.is_match(&expanded) {
            expanded = pattern.replace_all(&expanded, *full).into_owned();
        }
    }
    expanded
}

fn rule_based_matches(
    query_lower: &str,
    candidates: &[ProviderRecord],
    location_filter: Option<&QueryFilters>,
) -> Vec<SemanticMatch> {
    let mut matches = Vec::new();

    for candidate in candidates {
        if !location_allows(candidate, location_filter) {
            continue;
        }

        let legal_name = candidate.legal_name.to_lowercase();
        let parent_org = candidate
            .parent_organization
            .as_deref()
            .unwrap_or("")
            .to_lowercase();

        let found = if !parent_org.is_empty() && parent_org.contains(query_lower) {
            Some((
                0.9,
                SemanticMatchKind::ParentChild,
                format!("query matches parent organization '{parent_org}'"),
            ))
        } else if legal_name.contains(query_lower) {
            Some((
                0.95,
                SemanticMatchKind::Exact,
                "query found in legal name".to_string(),
            ))
        } else if candidate
            .dba_names
            .iter()
            .any(|dba| dba.to_lowercase().contains(query_lower))
        {
            Some((0.85, SemanticMatchKind::Dba, "query matches a DBA name".to_string()))
        } else if !legal_name.is_empty() && query_lower.contains(&legal_name) {
            Some((
                0.9,
                SemanticMatchKind::Regional,
                format!("legal name '{legal_name}' is a variant of the query"),
            ))
        } else {
            None
        };

        if let Some((score, kind, reasoning)) = found {
            matches.push(SemanticMatch {
                provider_id: candidate.id,
                provider_name: candidate.legal_name.clone(),
                match_score: score,
                match_kind: kind,
                reasoning,
                confidence: score,
            });
        }
    }

    matches.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

fn location_allows(candidate: &ProviderRecord, filter: Option<&QueryFilters>) -> bool {
    let Some(filter) = filter else { return true };

    let state_ok = match (&filter.state, &candidate.address_state) {
        (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
        (Some(_), None) => false,
        (None, _) => true,
    };
    let city_ok = match (&filter.city, &candidate.address_city) {
        (Some(want), Some(have)) => have.to_lowercase().contains(&want.to_lowercase()),
        (Some(_), None) => false,
        (None, _) => true,
    };
    state_ok && city_ok
}

fn filtered(matches: Vec<SemanticMatch>, threshold: f64) -> Vec<SemanticMatch> {
    matches
        .into_iter()
        .filter(|m| m.confidence >= threshold)
        .collect()
}

fn match_prompt(
    query: &str,
    candidates: &[ProviderRecord],
    location_filter: Option<&QueryFilters>,
) -> String {
    let records = candidates
        .iter()
        .take(PROMPT_CANDIDATE_CAP)
        .enumerate()
        .map(|(i, c)| {
            let mut lines = vec![
                format!("{}. ID: {}", i + 1, c.id),
                format!("   Legal Name: {}", c.legal_name),
                format!(
                    "   Parent Org: {}",
                    c.parent_organization.as_deref().unwrap_or("None")
                ),
                format!(
                    "   Location: {}, {}",
                    c.address_city.as_deref().unwrap_or("?"),
                    c.address_state.as_deref().unwrap_or("?")
                ),
            ];
            if !c.dba_names.is_empty() {
                lines.push(format!("   DBA Names: {}", c.dba_names.join(", ")));
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let location = location_filter
        .map(|f| {
            format!(
                "State: {}, City: {}",
                f.state.as_deref().unwrap_or("Any"),
                f.city.as_deref().unwrap_or("Any")
            )
        })
        .unwrap_or_else(|| "Any".to_string());

    format!(
        r#"You are matching a user's provider search against database records.

USER SEARCHING FOR: "{query}"
LOCATION FILTER: {location}

DATABASE RECORDS:
{records}

Determine which records (if any) match what the user is searching for.
Consider:
1. Abbreviations: "CK" could be "Comfort Keepers"
2. Parent companies: "Home Instead" could match "Home Instead - Metrowest"
3. DBA names: a business might operate under a different name
4. Regional variations: "Home Instead Senior Care" vs "Home Instead"

Return a JSON array of matches:
[
    {{
        "provider_id": "uuid",
        "provider_name": "Full Legal Name",
        "match_score": 0.95,
        "match_type": "abbreviation|parent_child|dba|regional|exact",
        "reasoning": "Brief explanation",
        "confidence": 0.9
    }}
]

IMPORTANT:
- Only return matches you are confident about (score > 0.7)
- If no good matches exist, return an empty array []
- Do not force matches that make no sense
- Respect the location filter

Return ONLY a valid JSON array, no markdown."#
    )
}

fn parse_match(item: &Value) -> Option<SemanticMatch> {
    let provider_id = Uuid::parse_str(item.get("provider_id")?.as_str()?).ok()?;
    Some(SemanticMatch {
        provider_id,
        provider_name: item.get("provider_name")?.as_str()?.to_string(),
        match_score: item.get("match_score").and_then(Value::as_f64).unwrap_or(0.0),
        match_kind: item
            .get("match_type")
            .and_then(Value::as_str)
            .map(SemanticMatchKind::parse)
            .unwrap_or(SemanticMatchKind::Semantic),
        reasoning: item
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence: item.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(name: &str, parent: Option<&str>, city: &str, state: &str) -> ProviderRecord {
        ProviderRecord {
            id: Uuid::new_v4(),
            npi: None,
            legal_name: name.to_string(),
            dba_names: Vec::new(),
            name_variations: Vec::new(),
            address_full: None,
            address_street: None,
            address_city: Some(city.to_string()),
            address_state: Some(state.to_string()),
            address_zip: None,
            phone: None,
            fax: None,
            email: None,
            website: None,
            parent_organization: parent.map(str::to_string),
            real_estate_owner: None,
            franchise_status: false,
            franchise_id: None,
            provider_type: None,
            confidence_score: 0.8,
            data_source_urls: Vec::new(),
            raw_search_data: None,
            created_at: Utc::now(),
            validated_at: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn abbreviations_expand_as_whole_words() {
        assert_eq!(expand_abbreviations("CK in Michigan"), "comfort keepers in michigan");
        // "ck" inside a word must not expand
        assert_eq!(expand_abbreviations("bucket list"), "bucket list");
    }

    #[tokio::test]
    async fn parent_child_match() {
        let matcher = SemanticMatcher::new(None);
        let candidates = vec![candidate(
            "Home Instead - Metrowest",
            Some("Home Instead"),
            "Framingham",
            "MA",
        )];

        let matches = matcher.r#match("home instead", &candidates, None, 0.7).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_kind, SemanticMatchKind::ParentChild);
        assert!(matches[0].confidence >= 0.7);
    }

    #[tokio::test]
    async fn regional_variant_matches_in_reverse() {
        let matcher = SemanticMatcher::new(None);
        let candidates = vec![candidate("Home Instead", None, "Boston", "MA")];

        let matches = matcher
            .r#match("Home Instead Metrowest", &candidates, None, 0.7)
            .await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_kind, SemanticMatchKind::Regional);
    }

    #[tokio::test]
    async fn location_filter_is_a_hard_gate() {
        let matcher = SemanticMatcher::new(None);
        let candidates = vec![candidate("Home Instead", None, "Detroit", "MI")];
        let filter = QueryFilters {
            state: Some("MA".to_string()),
            ..QueryFilters::default()
        };

        let matches = matcher
            .r#match("home instead", &candidates, Some(&filter), 0.7)
            .await;
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn no_model_and_no_rule_hit_is_empty() {
        let matcher = SemanticMatcher::new(None);
        let candidates = vec![candidate("Sunrise Senior Living", None, "Boston", "MA")];

        let matches = matcher.r#match("home instead", &candidates, None, 0.7).await;
        assert!(matches.is_empty());
    }
}
