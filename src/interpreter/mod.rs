// src/interpreter/mod.rs
// Turns free text plus conversation context into a structured query.
// Two engines, one contract: a deterministic rule engine and an optional
// model-assisted engine; malformed model output falls back to the rules.

pub mod prompt;
pub mod rules;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::llm::{CompletionClient, json};
use crate::session::Session;
use crate::store::validate::normalize_state;

pub use types::{Intent, ParsedQuery, ProviderMention, QueryFilters};

const INTERPRET_MAX_TOKENS: u32 = 2000;

pub struct QueryInterpreter {
    client: Option<Arc<dyn CompletionClient>>,
}

impl QueryInterpreter {
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    pub fn rule_based() -> Self {
        Self { client: None }
    }

    pub async fn interpret(&self, query: &str, session: &Session) -> ParsedQuery {
        if let Some(client) = &self.client {
            let prompt = prompt::interpretation_prompt(query, session);
            match client.complete(&prompt, INTERPRET_MAX_TOKENS).await {
                Ok(response) => match parse_model_interpretation(&response) {
                    Ok(parsed) => return normalize(parsed),
                    Err(e) => warn!(error = %e, "uninterpretable model output, using rules"),
                },
                Err(e) => warn!(error = %e, "interpretation call failed, using rules"),
            }
        }

        normalize(rules::interpret(query, session))
    }
}

fn parse_model_interpretation(response: &str) -> Result<ParsedQuery, crate::llm::LlmError> {
    let value = json::extract_object(response)?;

    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .ok_or_else(|| crate::llm::LlmError::Malformed("missing or unknown intent".into()))?;

    let providers = value
        .get("providers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    Some(ProviderMention {
                        name: name.to_string(),
                        location: item
                            .get("location")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let filters = value
        .get("filters")
        .map(|f| QueryFilters {
            state: str_field(f, "state"),
            city: str_field(f, "city"),
            provider_type: str_field(f, "provider_type"),
            parent_organization: str_field(f, "parent_organization"),
        })
        .unwrap_or_default();

    let resolved_references = value
        .get("resolved_references")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let multi_step_plan = value
        .get("multi_step_plan")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedQuery {
        intent,
        providers,
        filters,
        resolved_references,
        multi_step_plan,
        clarification_needed: str_field(&value, "clarification_needed"),
        confidence: value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.8),
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// States come back from either engine as codes or full names; store them
/// as codes only.
fn normalize(mut parsed: ParsedQuery) -> ParsedQuery {
    if let Some(state) = parsed.filters.state.take() {
        parsed.filters.state = normalize_state(&state).map(str::to_string);
    }
    parsed
}
