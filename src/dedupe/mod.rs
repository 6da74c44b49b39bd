// src/dedupe/mod.rs
// Decides whether two candidate records denote the same real-world entity.
// Used by web research (candidate-vs-candidate) and by the orchestrator
// (candidate-vs-store) with the same rule order.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::llm::{CompletionClient, json};
use crate::research::types::CandidateLocation;
use crate::store::{ProviderRecord, normalize_phone};

/// Whether distinct suite/unit numbers at one street address count as the
/// same entity. The two behaviors both exist in the wild: candidate merge
/// wants them collapsed, fine-grained same-building checks want them kept
/// apart. Callers choose; neither is silently assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressPolicy {
    SameBuildingIsSameEntity,
    SuitesAreDistinct,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub reason: String,
    pub confidence: f64,
    pub matching_id: Option<Uuid>,
}

/// The identity-relevant projection of a record, however it is stored.
#[derive(Debug, Clone, Default)]
pub struct IdentityView {
    pub npi: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub summary: Value,
}

impl From<&CandidateLocation> for IdentityView {
    fn from(c: &CandidateLocation) -> Self {
        Self {
            npi: c.npi.clone(),
            phone: c.phone.clone(),
            address: c.address.clone(),
            city: c.city.clone(),
            summary: serde_json::to_value(c).unwrap_or(Value::Null),
        }
    }
}

impl From<&ProviderRecord> for IdentityView {
    fn from(p: &ProviderRecord) -> Self {
        Self {
            npi: p.npi.clone(),
            phone: p.phone.clone(),
            address: p.address_full.clone().or_else(|| p.address_street.clone()),
            city: p.address_city.clone(),
            summary: serde_json::to_value(p).unwrap_or(Value::Null),
        }
    }
}

static SUITE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\b(?:suite|ste|unit|apt|apartment)|#)\s*[\w-]+").expect("suite"));

const JUDGMENT_MAX_TOKENS: u32 = 500;

pub struct IdentityResolver {
    policy: AddressPolicy,
    client: Option<Arc<dyn CompletionClient>>,
}

impl IdentityResolver {
    pub fn new(policy: AddressPolicy, client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { policy, client }
    }

    pub fn policy(&self) -> AddressPolicy {
        self.policy
    }

    /// Full decision: rule cascade, then model judgment for the ambiguous
    /// remainder, then a cautious default of "not duplicate".
    pub async fn resolve(
        &self,
        new: &IdentityView,
        existing: &IdentityView,
        existing_id: Option<Uuid>,
    ) -> DuplicateVerdict {
        if let Some(verdict) = self.rule_based(new, existing, existing_id) {
            return verdict;
        }

        if let Some(client) = &self.client {
            if let Some(verdict) = self.model_judgment(client.as_ref(), new, existing, existing_id).await
            {
                return verdict;
            }
        }

        DuplicateVerdict {
            is_duplicate: false,
            reason: "different providers based on available data".to_string(),
            confidence: 0.7,
            matching_id: None,
        }
    }

    /// Rule cascade, short-circuiting in strict order: registry id beats
    /// phone beats address beats city. Returns None when no rule applies.
    pub fn rule_based(
        &self,
        new: &IdentityView,
        existing: &IdentityView,
        existing_id: Option<Uuid>,
    ) -> Option<DuplicateVerdict> {
        if let (Some(a), Some(b)) = (&new.npi, &existing.npi) {
            if a == b {
                return Some(DuplicateVerdict {
                    is_duplicate: true,
                    reason: format!("same registry identifier {a}"),
                    confidence: 1.0,
                    matching_id: existing_id,
                });
            }
        }

        let new_phone = new.phone.as_deref().map(normalize_phone).unwrap_or_default();
        let existing_phone = existing
            .phone
            .as_deref()
            .map(normalize_phone)
            .unwrap_or_default();
        if !new_phone.is_empty() && new_phone == existing_phone {
            return Some(DuplicateVerdict {
                is_duplicate: true,
                reason: format!("same phone number {new_phone}"),
                confidence: 0.95,
                matching_id: existing_id,
            });
        }

        let new_addr = new
            .address
            .as_deref()
            .map(|a| normalize_address(a, self.policy))
            .unwrap_or_default();
        let existing_addr = existing
            .address
            .as_deref()
            .map(|a| normalize_address(a, self.policy))
            .unwrap_or_default();
        if !new_addr.is_empty() && new_addr == existing_addr {
            return Some(DuplicateVerdict {
                is_duplicate: true,
                reason: "same normalized address".to_string(),
                confidence: 0.9,
                matching_id: existing_id,
            });
        }

        if let (Some(a), Some(b)) = (&new.city, &existing.city) {
            if !a.eq_ignore_ascii_case(b) {
                return Some(DuplicateVerdict {
                    is_duplicate: false,
                    reason: "different cities".to_string(),
                    confidence: 0.9,
                    matching_id: None,
                });
            }
        }

        None
    }

    async fn model_judgment(
        &self,
        client: &dyn CompletionClient,
        new: &IdentityView,
        existing: &IdentityView,
        existing_id: Option<Uuid>,
    ) -> Option<DuplicateVerdict> {
        let prompt = judgment_prompt(new, existing);

        let response = match client.complete(&prompt, JUDGMENT_MAX_TOKENS).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "duplicate judgment call failed");
                return None;
            }
        };

        let value = match json::extract_object(&response) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "unparseable duplicate judgment");
                return None;
            }
        };

        let is_duplicate = value.get("is_duplicate")?.as_bool()?;
        Some(DuplicateVerdict {
            is_duplicate,
            reason: value
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("model judgment")
                .to_string(),
            confidence: value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.8),
            matching_id: if is_duplicate { existing_id } else { None },
        })
    }

    /// Collapse a batch of fresh candidates. Pairwise rule checks only;
    /// duplicates merge into the richer record.
    pub fn dedupe_candidates(
        &self,
        candidates: Vec<CandidateLocation>,
    ) -> (Vec<CandidateLocation>, usize) {
        let mut unique: Vec<CandidateLocation> = Vec::new();
        let mut removed = 0usize;

        for candidate in candidates {
            let view = IdentityView::from(&candidate);
            let duplicate_of = unique.iter().position(|kept| {
                self.rule_based(&view, &kept.into(), None)
                    .is_some_and(|v| v.is_duplicate)
            });

            match duplicate_of {
                Some(i) => {
                    let kept = std::mem::take(&mut unique[i]);
                    unique[i] = merge_candidates(kept, candidate);
                    removed += 1;
                }
                None => unique.push(candidate),
            }
        }

        (unique, removed)
    }
}

/// Normalize an address for comparison. Under `SameBuildingIsSameEntity`
/// suite/unit tokens are removed entirely; under `SuitesAreDistinct` they
/// are kept but spelled consistently so formatting noise alone cannot
/// split one location into two.
pub fn normalize_address(address: &str, policy: AddressPolicy) -> String {
    let mut addr = address.to_lowercase();

    match policy {
        AddressPolicy::SameBuildingIsSameEntity => {
            addr = SUITE_RE.replace_all(&addr, "").into_owned();
        }
        AddressPolicy::SuitesAreDistinct => {
            addr = addr.replace("suite", "ste").replace("apartment", "apt");
            static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*(\w+)").expect("hash"));
            addr = HASH_RE.replace_all(&addr, "unit $1").into_owned();
        }
    }

    addr = addr
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    addr.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the richer record; backfill what only the other one had; names
/// from the discarded record survive as aliases.
pub fn merge_candidates(a: CandidateLocation, b: CandidateLocation) -> CandidateLocation {
    let (mut primary, discarded) = if b.richness() > a.richness() { (b, a) } else { (a, b) };

    if let (Some(kept), Some(lost)) = (&primary.name, &discarded.name) {
        if !kept.eq_ignore_ascii_case(lost) && !primary.dba_names.iter().any(|d| d == lost) {
            primary.dba_names.push(lost.clone());
        }
    }

    primary.name = primary.name.or(discarded.name);
    primary.address = primary.address.or(discarded.address);
    primary.city = primary.city.or(discarded.city);
    primary.state = primary.state.or(discarded.state);
    primary.zip = primary.zip.or(discarded.zip);
    primary.phone = primary.phone.or(discarded.phone);
    primary.fax = primary.fax.or(discarded.fax);
    primary.website = primary.website.or(discarded.website);
    primary.franchise_id = primary.franchise_id.or(discarded.franchise_id);
    primary.npi = primary.npi.or(discarded.npi);
    primary.parent_organization = primary.parent_organization.or(discarded.parent_organization);

    for dba in discarded.dba_names {
        if !primary.dba_names.contains(&dba) {
            primary.dba_names.push(dba);
        }
    }
    for source in discarded.sources {
        if !primary.sources.contains(&source) {
            primary.sources.push(source);
        }
    }
    for url in discarded.source_urls {
        if !primary.source_urls.contains(&url) {
            primary.source_urls.push(url);
        }
    }

    primary
}

fn judgment_prompt(new: &IdentityView, existing: &IdentityView) -> String {
    format!(
        r#"Determine if these are duplicate provider records.

NEW PROVIDER:
{new}

EXISTING PROVIDER:
{existing}

Are these the same provider location? Consider:
- Same phone number: usually a duplicate
- Franchise vs corporate HQ: NOT a duplicate
- Different cities: NOT a duplicate
- Slight name variations (Inc, LLC): may be the same

Return JSON:
{{
    "is_duplicate": true,
    "reason": "Explanation of the decision",
    "confidence": 0.95
}}

Return ONLY valid JSON."#,
        new = serde_json::to_string_pretty(&new.summary).unwrap_or_default(),
        existing = serde_json::to_string_pretty(&existing.summary).unwrap_or_default(),
    )
}
