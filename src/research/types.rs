// src/research/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a piece of research data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    WebSite,
    RegistryApi,
    BusinessDirectory,
    NewsArchive,
    Database,
}

/// Historical event kinds recoverable from archival sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OwnershipChange,
    NameChange,
    Acquisition,
    Merger,
    FranchiseSale,
    Rebranding,
    Opening,
    Closure,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ownership_change" => Some(EventKind::OwnershipChange),
            "name_change" => Some(EventKind::NameChange),
            "acquisition" => Some(EventKind::Acquisition),
            "merger" => Some(EventKind::Merger),
            "franchise_sale" => Some(EventKind::FranchiseSale),
            "rebranding" => Some(EventKind::Rebranding),
            "opening" => Some(EventKind::Opening),
            "closure" => Some(EventKind::Closure),
            _ => None,
        }
    }

    pub fn is_ownership(&self) -> bool {
        matches!(
            self,
            EventKind::OwnershipChange
                | EventKind::Acquisition
                | EventKind::Merger
                | EventKind::FranchiseSale
        )
    }

    pub fn is_naming(&self) -> bool {
        matches!(self, EventKind::NameChange | EventKind::Rebranding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventConfidence {
    High,
    Medium,
    Low,
}

impl EventConfidence {
    pub fn parse(s: &str) -> Self {
        match s {
            "high" => EventConfidence::High,
            "low" => EventConfidence::Low,
            _ => EventConfidence::Medium,
        }
    }
}

/// One historical event for a provider, extracted from archival content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub event_kind: EventKind,
    /// ISO date or bare year, as stated by the source.
    pub event_date: Option<String>,
    pub description: String,
    pub source_url: Option<String>,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub transaction_value: Option<String>,
    pub confidence: EventConfidence,
}

/// A freshly extracted location that has not been accepted into the store.
/// Missing data stays `None`; extraction never invents values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateLocation {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub website: Option<String>,
    pub franchise_id: Option<String>,
    /// Filled in by registry validation when a match is found.
    pub npi: Option<String>,
    pub parent_organization: Option<String>,
    #[serde(default)]
    pub dba_names: Vec<String>,
    #[serde(default)]
    pub sources: Vec<DataSource>,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

impl CandidateLocation {
    /// How many substantive fields are populated. Used to pick the
    /// primary record when merging duplicates.
    pub fn richness(&self) -> usize {
        [
            self.name.is_some(),
            self.address.is_some(),
            self.city.is_some(),
            self.state.is_some(),
            self.zip.is_some(),
            self.phone.is_some(),
            self.fax.is_some(),
            self.website.is_some(),
            self.franchise_id.is_some(),
            self.npi.is_some(),
            self.parent_organization.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// A record returned by the external registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub npi: String,
    pub legal_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
}

/// A name the provider previously used, per archival sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousNameFinding {
    pub name: String,
    pub used_until: Option<String>,
    pub source_url: Option<String>,
}

/// A previous owner, per archival sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousOwnerFinding {
    pub owner: String,
    pub owned_until: Option<String>,
    pub source_url: Option<String>,
}

/// Everything one research run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchFindings {
    pub provider_name: String,
    pub locations: Vec<CandidateLocation>,
    pub registry_records: Vec<RegistryRecord>,
    pub previous_names: Vec<PreviousNameFinding>,
    pub previous_owners: Vec<PreviousOwnerFinding>,
    pub events: Vec<HistoricalEvent>,
    pub confidence: f64,
    pub source_urls: Vec<String>,
    pub warnings: Vec<String>,
    pub researched_at: DateTime<Utc>,
}

impl ResearchFindings {
    pub fn empty(provider_name: &str, warnings: Vec<String>) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            locations: Vec::new(),
            registry_records: Vec::new(),
            previous_names: Vec::new(),
            previous_owners: Vec::new(),
            events: Vec::new(),
            confidence: 0.0,
            source_urls: Vec::new(),
            warnings,
            researched_at: Utc::now(),
        }
    }
}
