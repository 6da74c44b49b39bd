// src/research/registry.rs
// External registry validation: look up candidate locations against the
// national provider registry and attach the matching identifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use super::types::{CandidateLocation, RegistryRecord};
use crate::config::Config;
use crate::llm::{CompletionClient, json};
use crate::store::normalize_phone;
use crate::web::FetchError;

/// Registry lookup capability: organization name + state in, candidate
/// registry records out.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn lookup(
        &self,
        name: &str,
        state: Option<&str>,
    ) -> Result<Vec<RegistryRecord>, FetchError>;
}

/// HTTP client for the NPI registry API.
pub struct NpiRegistryClient {
    client: Client,
    endpoint: String,
}

impl NpiRegistryClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.registry_api_url.clone(),
        })
    }
}

#[async_trait]
impl RegistryClient for NpiRegistryClient {
    async fn lookup(
        &self,
        name: &str,
        state: Option<&str>,
    ) -> Result<Vec<RegistryRecord>, FetchError> {
        let mut params = vec![
            ("version", "2.1".to_string()),
            ("organization_name", format!("{name}*")),
            ("limit", "20".to_string()),
        ];
        if let Some(state) = state {
            params.push(("state", state.to_string()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(FetchError::Status(status));
        }

        let body: Value = response.json().await?;
        Ok(parse_registry_results(&body))
    }
}

fn parse_registry_results(body: &Value) -> Vec<RegistryRecord> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|result| {
            let npi = result.get("number")?;
            let npi = match npi {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let legal_name = result
                .get("basic")
                .and_then(|b| b.get("organization_name"))
                .and_then(Value::as_str)?
                .to_string();

            // Prefer the practice location when several addresses come back.
            let address = result
                .get("addresses")
                .and_then(Value::as_array)
                .and_then(|addrs| {
                    addrs
                        .iter()
                        .find(|a| {
                            a.get("address_purpose").and_then(Value::as_str) == Some("LOCATION")
                        })
                        .or_else(|| addrs.first())
                });

            let field = |key: &str| {
                address
                    .and_then(|a| a.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };

            Some(RegistryRecord {
                npi,
                legal_name,
                address: field("address_1"),
                city: field("city"),
                state: field("state"),
                zip: field("postal_code"),
                phone: field("telephone_number"),
                status: result
                    .get("basic")
                    .and_then(|b| b.get("status"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

const REGISTRY_MATCH_MAX_TOKENS: u32 = 800;

/// Pick the registry record matching a candidate, if any. Model-assisted
/// when available; otherwise phone and city/name agreement decide.
pub async fn match_candidate(
    client: Option<&dyn CompletionClient>,
    candidate: &CandidateLocation,
    records: &[RegistryRecord],
) -> Option<RegistryRecord> {
    if records.is_empty() {
        return None;
    }

    if let Some(client) = client {
        if let Some(matched) = model_match(client, candidate, records).await {
            return Some(matched);
        }
    }

    deterministic_match(candidate, records)
}

async fn model_match(
    client: &dyn CompletionClient,
    candidate: &CandidateLocation,
    records: &[RegistryRecord],
) -> Option<RegistryRecord> {
    let prompt = format!(
        r#"Match this provider to registry results.

PROVIDER:
- Name: {name}
- Address: {address}
- City: {city}
- State: {state}
- Phone: {phone}
- Parent Organization: {parent}

REGISTRY RESULTS:
{records}

Which registry record (if any) matches this provider best? Business names
often differ from registered legal names; a phone match is strong evidence;
the address should at least share a city. Do not force a match.

Return JSON:
{{
    "matched_npi": "1234567890 or null",
    "match_confidence": 0.9,
    "reasoning": "why this record matches"
}}

Return ONLY valid JSON."#,
        name = candidate.name.as_deref().unwrap_or("Unknown"),
        address = candidate.address.as_deref().unwrap_or("Unknown"),
        city = candidate.city.as_deref().unwrap_or("Unknown"),
        state = candidate.state.as_deref().unwrap_or("Unknown"),
        phone = candidate.phone.as_deref().unwrap_or("Unknown"),
        parent = candidate.parent_organization.as_deref().unwrap_or("Unknown"),
        records = serde_json::to_string_pretty(&records[..records.len().min(10)])
            .unwrap_or_default(),
    );

    let response = match client.complete(&prompt, REGISTRY_MATCH_MAX_TOKENS).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "registry match call failed");
            return None;
        }
    };

    let value = match json::extract_object(&response) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unparseable registry match");
            return None;
        }
    };

    let npi = value.get("matched_npi")?.as_str()?;
    records.iter().find(|r| r.npi == npi).cloned()
}

fn deterministic_match(
    candidate: &CandidateLocation,
    records: &[RegistryRecord],
) -> Option<RegistryRecord> {
    let candidate_phone = candidate
        .phone
        .as_deref()
        .map(normalize_phone)
        .unwrap_or_default();

    if !candidate_phone.is_empty() {
        if let Some(record) = records.iter().find(|r| {
            r.phone
                .as_deref()
                .map(normalize_phone)
                .is_some_and(|p| p == candidate_phone)
        }) {
            return Some(record.clone());
        }
    }

    let candidate_city = candidate.city.as_deref()?.to_lowercase();
    let candidate_name = candidate.name.as_deref()?.to_lowercase();

    records
        .iter()
        .find(|r| {
            let city_ok = r
                .city
                .as_deref()
                .is_some_and(|c| c.to_lowercase() == candidate_city);
            let name = r.legal_name.to_lowercase();
            let name_ok = name.contains(&candidate_name) || candidate_name.contains(&name);
            city_ok && name_ok
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(npi: &str, name: &str, city: &str, phone: Option<&str>) -> RegistryRecord {
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

    #[test]
    fn registry_response_parses() {
        let body = json!({
            "result_count": 1,
            "results": [{
                "number": 1234567890u64,
                "basic": {"organization_name": "HOME INSTEAD INC", "status": "A"},
                "addresses": [
                    {"address_purpose": "MAILING", "city": "Omaha", "state": "NE"},
                    {"address_purpose": "LOCATION", "address_1": "123 Main St",
                     "city": "Boston", "state": "MA", "postal_code": "02101",
                     "telephone_number": "617-555-0100"}
                ]
            }]
        });

        let records = parse_registry_results(&body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].npi, "1234567890");
        assert_eq!(records[0].city.as_deref(), Some("Boston"));
    }

    #[test]
    fn phone_match_wins_deterministically() {
        let candidate = CandidateLocation {
            name: Some("Home Instead".to_string()),
            city: Some("Boston".to_string()),
            phone: Some("(617) 555-0100".to_string()),
            ..CandidateLocation::default()
        };
        let records = vec![
            record("1111111111", "SOMEONE ELSE LLC", "Boston", Some("617-555-9999")),
            record("2222222222", "HOME INSTEAD INC", "Boston", Some("6175550100")),
        ];

        let matched = deterministic_match(&candidate, &records).unwrap();
        assert_eq!(matched.npi, "2222222222");
    }

    #[test]
    fn no_forced_match() {
        let candidate = CandidateLocation {
            name: Some("Home Instead".to_string()),
            city: Some("Boston".to_string()),
            ..CandidateLocation::default()
        };
        let records = vec![record("1111111111", "SUNRISE SENIOR LIVING", "Worcester", None)];

        assert!(deterministic_match(&candidate, &records).is_none());
    }
}
