// src/store/mod.rs
// Provider record store over SQLite: lookup cascade, upserts, history, search log.

pub mod history;
pub mod query;
pub mod schema;
pub mod types;
pub mod validate;

use std::cmp::Ordering;

use chrono::Utc;
use similar::TextDiff;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

pub use types::{
    ChangeDetails, ChangeKind, HistoryEntry, MatchKind, NewProvider, PreviousName, PreviousOwner,
    ProviderField, ProviderRecord, SearchHit, SearchLogEntry, StoreStats,
};
pub use validate::{normalize_phone, normalize_state};

/// Store-layer failures. Connectivity and query errors are fatal to the
/// current operation and always propagate to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("provider not found: {0}")]
    NotFound(Uuid),

    #[error("malformed stored value: {0}")]
    Corrupt(String),
}

/// Parameters for the lookup cascade. All fields optional; `fuzzy` gates
/// the final similarity tier.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub npi: Option<String>,
    pub phone: Option<String>,
    pub parent_organization: Option<String>,
    pub fuzzy: bool,
    pub limit: i64,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            state: None,
            city: None,
            npi: None,
            phone: None,
            parent_organization: None,
            fuzzy: true,
            limit: 10,
        }
    }
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

// Fuzzy tier thresholds.
const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;
const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.70;
const LOW_CONFIDENCE_FLOOR: f64 = 0.50;

pub struct ProviderStore {
    pool: SqlitePool,
}

impl ProviderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables, full-text index, and triggers if missing.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in schema::SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Lookup cascade. Each tier returns early when it yields any result:
    /// registry id, normalized phone, name substring, full-text rank, then
    /// string similarity. With no text query, falls back to a filtered
    /// listing with weak confidence.
    pub async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchHit>, StoreError> {
        if let Some(npi) = &q.npi {
            let hits = self.search_by_npi(npi).await?;
            if !hits.is_empty() {
                return Ok(truncated(hits, q.limit));
            }
        }

        if let Some(phone) = &q.phone {
            let hits = self.search_by_phone(phone).await?;
            if !hits.is_empty() {
                return Ok(truncated(hits, q.limit));
            }
        }

        if let Some(text) = q.text.as_deref().filter(|t| !t.trim().is_empty()) {
            let hits = self.search_substring(text, q).await?;
            if !hits.is_empty() {
                return Ok(truncated(hits, q.limit));
            }

            let hits = self.search_fulltext(text, q).await?;
            if !hits.is_empty() {
                return Ok(truncated(hits, q.limit));
            }

            if q.fuzzy {
                let hits = self.search_fuzzy(text, q).await?;
                return Ok(truncated(hits, q.limit));
            }

            return Ok(Vec::new());
        }

        self.list_filtered(q).await
    }

    async fn search_by_npi(&self, npi: &str) -> Result<Vec<SearchHit>, StoreError> {
        let rows = sqlx::query(query::SELECT_BY_NPI)
            .bind(npi)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    match_kind: MatchKind::ExactNpi,
                    match_score: 1.0,
                    confidence: 1.0,
                    provider: ProviderRecord::from_row(row)?,
                })
            })
            .collect()
    }

    async fn search_by_phone(&self, phone: &str) -> Result<Vec<SearchHit>, StoreError> {
        let normalized = normalize_phone(phone);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(query::SELECT_BY_PHONE)
            .bind(&normalized)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    match_kind: MatchKind::ExactPhone,
                    match_score: 1.0,
                    confidence: 0.95,
                    provider: ProviderRecord::from_row(row)?,
                })
            })
            .collect()
    }

    async fn search_substring(
        &self,
        text: &str,
        q: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let pattern = format!("%{}%", text.to_lowercase());

        let mut sql = query::SELECT_SUBSTRING.to_string();
        append_filters(&mut sql, q);

        let mut stmt = sqlx::query(&sql).bind(&pattern).bind(&pattern).bind(&pattern);
        stmt = bind_filters(stmt, q);

        let rows = stmt.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    match_kind: MatchKind::Exact,
                    match_score: 1.0,
                    confidence: 0.95,
                    provider: ProviderRecord::from_row(row)?,
                })
            })
            .collect()
    }

    async fn search_fulltext(
        &self,
        text: &str,
        q: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let Some(expr) = query::fts_match_expr(text) else {
            return Ok(Vec::new());
        };

        let mut sql = query::SELECT_FULLTEXT.to_string();
        append_filters(&mut sql, q);
        sql.push_str(" ORDER BY rank");

        let mut stmt = sqlx::query(&sql).bind(&expr);
        stmt = bind_filters(stmt, q);

        let rows = stmt.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.try_get("rank")?;
                // bm25 reports better matches as more negative values.
                let goodness = (-rank).max(0.0);
                let score = (goodness / (1.0 + goodness)).clamp(0.0, 1.0);
                Ok(SearchHit {
                    match_kind: MatchKind::FullText,
                    match_score: score,
                    confidence: 0.85,
                    provider: ProviderRecord::from_row(row)?,
                })
            })
            .collect()
    }

    async fn search_fuzzy(&self, text: &str, q: &SearchQuery) -> Result<Vec<SearchHit>, StoreError> {
        let mut sql = query::SELECT_FILTERED.to_string();
        append_filters(&mut sql, q);

        let mut stmt = sqlx::query(&sql);
        stmt = bind_filters(stmt, q);

        let rows = stmt.fetch_all(&self.pool).await?;
        let needle = text.to_lowercase();

        let mut hits = Vec::new();
        for row in &rows {
            let provider = ProviderRecord::from_row(row)?;

            let name_score = similarity(&needle, &provider.legal_name.to_lowercase());
            let parent_score = provider
                .parent_organization
                .as_deref()
                .map(|p| similarity(&needle, &p.to_lowercase()))
                .unwrap_or(0.0);
            let score = name_score.max(parent_score);

            if score >= LOW_CONFIDENCE_FLOOR {
                hits.push(SearchHit {
                    match_kind: MatchKind::Fuzzy,
                    match_score: score,
                    confidence: score_to_confidence(score),
                    provider,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(Ordering::Equal)
        });
        debug!(query = text, hits = hits.len(), "fuzzy tier");
        Ok(hits)
    }

    /// Filtered listing with weak confidence, used when no text is given
    /// and as the semantic-matcher candidate pool.
    pub async fn list_filtered(&self, q: &SearchQuery) -> Result<Vec<SearchHit>, StoreError> {
        let mut sql = query::SELECT_FILTERED.to_string();
        append_filters(&mut sql, q);
        sql.push_str(" ORDER BY legal_name LIMIT ?");

        let mut stmt = sqlx::query(&sql);
        stmt = bind_filters(stmt, q);
        stmt = stmt.bind(q.limit);

        let rows = stmt.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    match_kind: MatchKind::Listing,
                    match_score: 0.5,
                    confidence: 0.5,
                    provider: ProviderRecord::from_row(row)?,
                })
            })
            .collect()
    }

    /// Insert a provider, upserting on registry-id conflict so that adding
    /// the same identifier twice updates fields instead of duplicating the
    /// record. Returns the id of the inserted or updated row.
    pub async fn add(&self, provider: &NewProvider) -> Result<Uuid, StoreError> {
        if provider.legal_name.trim().is_empty() {
            return Err(StoreError::Validation {
                field: "legal_name",
                message: "legal name is required".to_string(),
            });
        }
        if let Some(npi) = &provider.npi {
            validate::validate_npi(npi)?;
        }
        if let Some(state) = &provider.address_state {
            validate::validate_state(state)?;
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let variations = validate::name_variations(&provider.legal_name);
        let phone_normalized = provider.phone.as_deref().map(normalize_phone);

        let row = sqlx::query(query::INSERT_PROVIDER)
            .bind(id.to_string())
            .bind(&provider.npi)
            .bind(&provider.legal_name)
            .bind(json_text(&provider.dba_names)?)
            .bind(json_text(&variations)?)
            .bind(&provider.address_full)
            .bind(&provider.address_street)
            .bind(&provider.address_city)
            .bind(&provider.address_state)
            .bind(&provider.address_zip)
            .bind(&provider.phone)
            .bind(phone_normalized)
            .bind(&provider.fax)
            .bind(&provider.email)
            .bind(&provider.website)
            .bind(&provider.parent_organization)
            .bind(&provider.real_estate_owner)
            .bind(provider.franchise_status)
            .bind(&provider.franchise_id)
            .bind(&provider.provider_type)
            .bind(provider.confidence_score)
            .bind(json_text(&provider.data_source_urls)?)
            .bind(
                provider
                    .raw_search_data
                    .as_ref()
                    .map(|v| v.to_string()),
            )
            .bind(now)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let stored_id: String = row.try_get("id")?;
        Uuid::parse_str(&stored_id).map_err(|e| StoreError::Corrupt(format!("bad id: {e}")))
    }

    /// Direct field update without an audit entry. Changes that should be
    /// visible in history go through `record_change` instead.
    pub async fn update_field(
        &self,
        id: Uuid,
        field: ProviderField,
        value: &str,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE providers SET {} = ?, last_updated = ? WHERE id = ?",
            field.column()
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        if field == ProviderField::Phone {
            sqlx::query("UPDATE providers SET phone_normalized = ? WHERE id = ?")
                .bind(normalize_phone(value))
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ProviderRecord>, StoreError> {
        let row = sqlx::query(query::SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| ProviderRecord::from_row(&r)).transpose()
    }

    /// Administrative removal. The pipeline itself never calls this.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(query::DELETE_PROVIDER)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append one row to the search log. Write-only analytics.
    pub async fn log_search(&self, entry: &SearchLogEntry) -> Result<(), StoreError> {
        sqlx::query(query::INSERT_SEARCH_LOG)
            .bind(Uuid::new_v4().to_string())
            .bind(entry.provider_id.map(|id| id.to_string()))
            .bind(&entry.query)
            .bind(&entry.location)
            .bind(entry.match_found)
            .bind(entry.match_kind.map(|k| k.as_str()))
            .bind(entry.match_score)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(query::SELECT_STATS).fetch_one(&self.pool).await?;
        Ok(StoreStats {
            total_providers: row.try_get("total_providers")?,
            states_covered: row.try_get("states_covered")?,
            with_npi: row.try_get("with_npi")?,
            avg_confidence: row.try_get("avg_confidence")?,
        })
    }
}

fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    TextDiff::from_chars(a, b).ratio() as f64
}

fn score_to_confidence(score: f64) -> f64 {
    if score >= HIGH_CONFIDENCE_THRESHOLD {
        0.9
    } else if score >= MEDIUM_CONFIDENCE_THRESHOLD {
        0.7
    } else {
        0.5
    }
}

fn truncated(mut hits: Vec<SearchHit>, limit: i64) -> Vec<SearchHit> {
    hits.truncate(limit.max(0) as usize);
    hits
}

fn json_text(list: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(list).map_err(|e| StoreError::Corrupt(format!("encode list: {e}")))
}

fn append_filters(sql: &mut String, q: &SearchQuery) {
    if q.state.is_some() {
        sql.push_str(" AND address_state = ?");
    }
    if q.city.is_some() {
        sql.push_str(" AND lower(coalesce(address_city, '')) LIKE ?");
    }
    if q.parent_organization.is_some() {
        sql.push_str(" AND lower(coalesce(parent_organization, '')) LIKE ?");
    }
}

fn bind_filters<'a>(
    mut stmt: sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>>,
    q: &'a SearchQuery,
) -> sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>> {
    if let Some(state) = &q.state {
        stmt = stmt.bind(state);
    }
    if let Some(city) = &q.city {
        stmt = stmt.bind(format!("%{}%", city.to_lowercase()));
    }
    if let Some(parent) = &q.parent_organization {
        stmt = stmt.bind(format!("%{}%", parent.to_lowercase()));
    }
    stmt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_matches_close_strings() {
        assert!(similarity("home instead", "home instead") > 0.99);
        assert!(similarity("homestead", "home instead") > 0.70);
        assert!(similarity("visiting angels", "home instead") < 0.50);
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(score_to_confidence(0.9), 0.9);
        assert_eq!(score_to_confidence(0.75), 0.7);
        assert_eq!(score_to_confidence(0.55), 0.5);
    }

    #[test]
    fn filter_clauses_match_bind_order() {
        let q = SearchQuery {
            state: Some("MA".into()),
            city: Some("Boston".into()),
            ..SearchQuery::default()
        };
        let mut sql = String::from("SELECT 1 WHERE 1=1");
        append_filters(&mut sql, &q);
        assert_eq!(sql.matches('?').count(), 2);
    }
}
