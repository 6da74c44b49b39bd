// src/store/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::StoreError;

/// How a search hit was produced. Ordering of the variants mirrors the
/// lookup cascade: earlier kinds always outrank later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactNpi,
    ExactPhone,
    Exact,
    FullText,
    Fuzzy,
    Listing,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::ExactNpi => "exact_npi",
            MatchKind::ExactPhone => "exact_phone",
            MatchKind::Exact => "exact",
            MatchKind::FullText => "fulltext",
            MatchKind::Fuzzy => "fuzzy",
            MatchKind::Listing => "listing",
        }
    }
}

/// What kind of change a history entry documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NameChange,
    DbaChange,
    OwnershipChange,
    Merger,
    Acquisition,
    FranchiseSale,
    Rebranding,
    AddressChange,
    PhoneChange,
    Other,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::NameChange => "name_change",
            ChangeKind::DbaChange => "dba_change",
            ChangeKind::OwnershipChange => "ownership_change",
            ChangeKind::Merger => "merger",
            ChangeKind::Acquisition => "acquisition",
            ChangeKind::FranchiseSale => "franchise_sale",
            ChangeKind::Rebranding => "rebranding",
            ChangeKind::AddressChange => "address_change",
            ChangeKind::PhoneChange => "phone_change",
            ChangeKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "name_change" => ChangeKind::NameChange,
            "dba_change" => ChangeKind::DbaChange,
            "ownership_change" => ChangeKind::OwnershipChange,
            "merger" => ChangeKind::Merger,
            "acquisition" => ChangeKind::Acquisition,
            "franchise_sale" => ChangeKind::FranchiseSale,
            "rebranding" => ChangeKind::Rebranding,
            "address_change" => ChangeKind::AddressChange,
            "phone_change" => ChangeKind::PhoneChange,
            _ => ChangeKind::Other,
        }
    }
}

/// Provider fields that can be updated through the history-tracked path.
/// A closed set so the update SQL never interpolates caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderField {
    LegalName,
    ParentOrganization,
    RealEstateOwner,
    Phone,
    AddressFull,
    Website,
    Email,
}

impl ProviderField {
    pub fn column(&self) -> &'static str {
        match self {
            ProviderField::LegalName => "legal_name",
            ProviderField::ParentOrganization => "parent_organization",
            ProviderField::RealEstateOwner => "real_estate_owner",
            ProviderField::Phone => "phone",
            ProviderField::AddressFull => "address_full",
            ProviderField::Website => "website",
            ProviderField::Email => "email",
        }
    }
}

/// A stored provider record: one business entity at one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: Uuid,
    /// External registry identifier. Globally unique when present and the
    /// highest-trust identity key in every lookup path.
    pub npi: Option<String>,
    pub legal_name: String,
    pub dba_names: Vec<String>,
    pub name_variations: Vec<String>,
    pub address_full: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    /// Operating parent organization. Not the landlord.
    pub parent_organization: Option<String>,
    /// Property owner. Distinct relationship from `parent_organization`.
    pub real_estate_owner: Option<String>,
    pub franchise_status: bool,
    pub franchise_id: Option<String>,
    pub provider_type: Option<String>,
    pub confidence_score: f64,
    pub data_source_urls: Vec<String>,
    pub raw_search_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// Input shape for `ProviderStore::add`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProvider {
    pub npi: Option<String>,
    pub legal_name: String,
    pub dba_names: Vec<String>,
    pub address_full: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub parent_organization: Option<String>,
    pub real_estate_owner: Option<String>,
    pub franchise_status: bool,
    pub franchise_id: Option<String>,
    pub provider_type: Option<String>,
    pub confidence_score: f64,
    pub data_source_urls: Vec<String>,
    pub raw_search_data: Option<Value>,
}

/// One ranked result from the lookup cascade.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub match_kind: MatchKind,
    /// Raw tier score, 0.0-1.0 (similarity ratio for the fuzzy tier,
    /// normalized rank for full-text, 1.0 for exact tiers).
    pub match_score: f64,
    pub confidence: f64,
    pub provider: ProviderRecord,
}

/// Immutable audit entry for one field change on one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub change_kind: ChangeKind,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub effective_date: DateTime<Utc>,
    pub source: String,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: Option<String>,
}

/// Metadata for a history-tracked update.
#[derive(Debug, Clone)]
pub struct ChangeDetails {
    pub change_kind: ChangeKind,
    pub effective_date: Option<DateTime<Utc>>,
    pub source: String,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

impl ChangeDetails {
    pub fn new(change_kind: ChangeKind, source: impl Into<String>) -> Self {
        Self {
            change_kind,
            effective_date: None,
            source: source.into(),
            notes: None,
            recorded_by: None,
        }
    }
}

/// A previously used name recovered from history.
#[derive(Debug, Clone, Serialize)]
pub struct PreviousName {
    pub name: String,
    pub change_kind: ChangeKind,
    pub effective_date: DateTime<Utc>,
    pub source: String,
}

/// A previous owner or parent organization recovered from history.
#[derive(Debug, Clone, Serialize)]
pub struct PreviousOwner {
    pub owner: String,
    pub effective_date: DateTime<Utc>,
    pub source: String,
    pub notes: Option<String>,
}

/// One row per lookup attempt. Written for analytics, never read back
/// into matching.
#[derive(Debug, Clone)]
pub struct SearchLogEntry {
    pub query: String,
    pub location: Option<String>,
    pub match_found: bool,
    pub match_kind: Option<MatchKind>,
    pub match_score: Option<f64>,
    pub provider_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_providers: i64,
    pub states_covered: i64,
    pub with_npi: i64,
    pub avg_confidence: f64,
}

fn json_list(raw: Option<String>) -> Result<Vec<String>, StoreError> {
    match raw {
        None => Ok(Vec::new()),
        Some(text) if text.is_empty() => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| StoreError::Corrupt(format!("bad JSON list column: {e}"))),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("bad uuid '{raw}': {e}")))
}

impl ProviderRecord {
    pub fn from_row(row: &SqliteRow) -> Result<Self, StoreError> {
        let raw_search_data: Option<String> = row.try_get("raw_search_data")?;
        Ok(Self {
            id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
            npi: row.try_get("npi")?,
            legal_name: row.try_get("legal_name")?,
            dba_names: json_list(row.try_get("dba_names")?)?,
            name_variations: json_list(row.try_get("name_variations")?)?,
            address_full: row.try_get("address_full")?,
            address_street: row.try_get("address_street")?,
            address_city: row.try_get("address_city")?,
            address_state: row.try_get("address_state")?,
            address_zip: row.try_get("address_zip")?,
            phone: row.try_get("phone")?,
            fax: row.try_get("fax")?,
            email: row.try_get("email")?,
            website: row.try_get("website")?,
            parent_organization: row.try_get("parent_organization")?,
            real_estate_owner: row.try_get("real_estate_owner")?,
            franchise_status: row.try_get("franchise_status")?,
            franchise_id: row.try_get("franchise_id")?,
            provider_type: row.try_get("provider_type")?,
            confidence_score: row.try_get("confidence_score")?,
            data_source_urls: json_list(row.try_get("data_source_urls")?)?,
            raw_search_data: raw_search_data
                .map(|text| {
                    serde_json::from_str(&text)
                        .map_err(|e| StoreError::Corrupt(format!("bad raw_search_data: {e}")))
                })
                .transpose()?,
            created_at: row.try_get("created_at")?,
            validated_at: row.try_get("validated_at")?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

impl HistoryEntry {
    pub fn from_row(row: &SqliteRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
            provider_id: parse_uuid(row.try_get::<String, _>("provider_id")?.as_str())?,
            change_kind: ChangeKind::parse(row.try_get::<String, _>("change_kind")?.as_str()),
            field_name: row.try_get("field_name")?,
            old_value: row.try_get("old_value")?,
            new_value: row.try_get("new_value")?,
            effective_date: row.try_get("effective_date")?,
            source: row.try_get("source")?,
            notes: row.try_get("notes")?,
            recorded_at: row.try_get("recorded_at")?,
            recorded_by: row.try_get("recorded_by")?,
        })
    }
}
