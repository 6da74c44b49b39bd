// src/research/extract.rs
// Structured-field and historical extraction over stripped page text.
// Model-assisted when a completion client is wired; a small heuristic
// extractor stands in otherwise so the pipeline still runs offline.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::types::{
    CandidateLocation, DataSource, EventConfidence, EventKind, HistoricalEvent,
};
use crate::llm::{CompletionClient, json};
use crate::store::validate::normalize_state;

const EXTRACT_MAX_TOKENS: u32 = 4000;
const HISTORY_MAX_TOKENS: u32 = 2000;

pub fn extraction_prompt(provider_name: &str, state: Option<&str>, content: &str) -> String {
    format!(
        r#"Extract provider locations from this web content.

PROVIDER NAME: {provider_name}
TARGET STATE: {target_state}

WEB CONTENT:
{content}

Extract ALL locations for this provider. For each location:
- name: full location name (e.g. "Home Instead - Metrowest")
- address: full street address
- city: city name
- state: 2-letter state code
- zip: ZIP code
- phone: phone number
- fax: fax number if present
- website: location-specific URL if present
- franchise_id: any location identifier
- parent_organization: parent brand if stated

Return a JSON array:
[
    {{
        "name": "...",
        "address": "...",
        "city": "...",
        "state": "XX",
        "zip": "...",
        "phone": "...",
        "fax": null,
        "website": null,
        "franchise_id": null,
        "parent_organization": null
    }}
]

RULES:
- Only extract locations in the target state, when one is given
- Use null for anything the content does not state. Never invent data.
- Normalize state to 2-letter codes

Return ONLY a valid JSON array."#,
        target_state = state.unwrap_or("Any"),
    )
}

pub fn history_prompt(provider_name: &str, content: &str) -> String {
    format!(
        r#"Extract ownership and naming history for {provider_name} from this content.

CONTENT:
{content}

Look for:
1. Previous owners (names, dates)
2. Previous business names or trade names
3. Acquisitions and mergers (buyer, seller, date, price)
4. Franchise sales or transfers
5. Rebranding

Return a JSON array of events:
[
    {{
        "event_type": "ownership_change|name_change|acquisition|merger|franchise_sale|rebranding|opening|closure",
        "event_date": "YYYY-MM-DD or YYYY",
        "description": "brief description",
        "previous_value": "previous owner or name, if applicable",
        "new_value": "new owner or name, if applicable",
        "transaction_value": "e.g. $2.5M, if mentioned",
        "confidence": "high|medium|low"
    }}
]

If the content has no relevant history, return an empty array.
Return ONLY a valid JSON array."#,
    )
}

/// Extract candidate locations from one page's stripped text.
pub async fn extract_locations(
    client: Option<&dyn CompletionClient>,
    provider_name: &str,
    state: Option<&str>,
    content: &str,
    source_url: &str,
) -> Vec<CandidateLocation> {
    let mut locations = match client {
        Some(client) => {
            let prompt = extraction_prompt(provider_name, state, content);
            match client.complete(&prompt, EXTRACT_MAX_TOKENS).await {
                Ok(response) => parse_locations(&response),
                Err(e) => {
                    warn!(error = %e, source_url, "location extraction call failed");
                    Vec::new()
                }
            }
        }
        None => heuristic_locations(provider_name, content),
    };

    for location in &mut locations {
        location.sources.push(DataSource::WebSite);
        location.source_urls.push(source_url.to_string());
    }
    locations
}

/// Second pass over the same content: previous names, previous owners,
/// narrative history. Model-only; without a client this yields nothing.
pub async fn extract_history(
    client: Option<&dyn CompletionClient>,
    provider_name: &str,
    content: &str,
    source_url: &str,
) -> Vec<HistoricalEvent> {
    let Some(client) = client else {
        return Vec::new();
    };

    let prompt = history_prompt(provider_name, content);
    let response = match client.complete(&prompt, HISTORY_MAX_TOKENS).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, source_url, "history extraction call failed");
            return Vec::new();
        }
    };

    let items = match json::extract_array(&response) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, source_url, "unparseable history extraction");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| {
            let kind = EventKind::parse(item.get("event_type")?.as_str()?)?;
            Some(HistoricalEvent {
                event_kind: kind,
                event_date: str_field(item, "event_date"),
                description: str_field(item, "description").unwrap_or_default(),
                source_url: Some(source_url.to_string()),
                previous_value: str_field(item, "previous_value"),
                new_value: str_field(item, "new_value"),
                transaction_value: str_field(item, "transaction_value"),
                confidence: item
                    .get("confidence")
                    .and_then(Value::as_str)
                    .map(EventConfidence::parse)
                    .unwrap_or(EventConfidence::Medium),
            })
        })
        .collect()
}

fn parse_locations(response: &str) -> Vec<CandidateLocation> {
    let items = match json::extract_array(response) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "unparseable extraction output");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| {
            let location = CandidateLocation {
                name: str_field(item, "name"),
                address: str_field(item, "address"),
                city: str_field(item, "city"),
                state: str_field(item, "state")
                    .and_then(|s| normalize_state(&s).map(str::to_string)),
                zip: str_field(item, "zip"),
                phone: str_field(item, "phone"),
                fax: str_field(item, "fax"),
                website: str_field(item, "website"),
                franchise_id: str_field(item, "franchise_id"),
                npi: None,
                parent_organization: str_field(item, "parent_organization"),
                ..CandidateLocation::default()
            };
            // A candidate with no name and no address is noise.
            (location.name.is_some() || location.address.is_some()).then_some(location)
        })
        .collect()
}

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}").expect("phone"));

static CITY_STATE_ZIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Z][A-Za-z .]+),\s*([A-Z]{2})\s+(\d{5})(?:-\d{4})?").expect("city/state/zip")
});

/// Offline stand-in for model extraction: one candidate per distinct
/// "City, ST 12345" occurrence, with the nearest phone number attached.
fn heuristic_locations(provider_name: &str, content: &str) -> Vec<CandidateLocation> {
    let phones: Vec<&str> = PHONE_RE.find_iter(content).map(|m| m.as_str()).collect();

    CITY_STATE_ZIP_RE
        .captures_iter(content)
        .enumerate()
        .map(|(i, caps)| CandidateLocation {
            name: Some(provider_name.to_string()),
            city: Some(caps[1].trim().to_string()),
            state: normalize_state(&caps[2]).map(str::to_string),
            zip: Some(caps[3].to_string()),
            phone: phones.get(i).map(|p| p.to_string()),
            ..CandidateLocation::default()
        })
        .collect()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_empty_candidates() {
        let response = r#"[
            {"name": "Home Instead - Metrowest", "city": "Framingham", "state": "Massachusetts"},
            {"name": null, "address": null, "city": "Boston"}
        ]"#;

        let locations = parse_locations(response);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].state.as_deref(), Some("MA"));
    }

    #[test]
    fn heuristic_finds_city_state_zip() {
        let content = "Visit us at 123 Main St, Boston, MA 02101 or call (617) 555-0100.";
        let locations = heuristic_locations("Home Instead", content);

        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].city.as_deref(), Some("Boston"));
        assert_eq!(locations[0].state.as_deref(), Some("MA"));
        assert_eq!(locations[0].phone.as_deref(), Some("(617) 555-0100"));
    }
}
