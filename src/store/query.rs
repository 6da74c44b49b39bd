// src/store/query.rs

//! SQL query strings for the provider store. Dynamic filter clauses are
//! appended by the callers in `mod.rs`; everything here is parameterized.

pub const SELECT_BY_ID: &str = "SELECT * FROM providers WHERE id = ?";

pub const SELECT_BY_NPI: &str = "SELECT * FROM providers WHERE npi = ?";

pub const SELECT_BY_PHONE: &str = "SELECT * FROM providers WHERE phone_normalized = ?";

/// Case-insensitive substring match on legal name, alias list, and parent
/// organization. The alias column is JSON text, which LIKE scans just fine.
pub const SELECT_SUBSTRING: &str = r#"
    SELECT * FROM providers
    WHERE (lower(legal_name) LIKE ?
           OR lower(coalesce(parent_organization, '')) LIKE ?
           OR lower(dba_names) LIKE ?)
"#;

/// Relevance-ranked full-text lookup. bm25 ranks lower-is-better; callers
/// normalize it into a 0-1 score. The subquery keeps the FTS columns out
/// of scope so appended provider filters stay unambiguous.
pub const SELECT_FULLTEXT: &str = r#"
    SELECT p.*, f.rank
    FROM (
        SELECT rowid, bm25(providers_fts) AS rank
        FROM providers_fts
        WHERE providers_fts MATCH ?
    ) f
    JOIN providers p ON p.rowid = f.rowid
    WHERE 1=1
"#;

/// Filtered scan used by the fuzzy tier and the listing fallback.
pub const SELECT_FILTERED: &str = "SELECT * FROM providers WHERE 1=1";

pub const INSERT_PROVIDER: &str = r#"
    INSERT INTO providers (
        id, npi, legal_name, dba_names, name_variations,
        address_full, address_street, address_city, address_state, address_zip,
        phone, phone_normalized, fax, email, website,
        parent_organization, real_estate_owner, franchise_status, franchise_id,
        provider_type, confidence_score, data_source_urls, raw_search_data,
        created_at, validated_at, last_updated
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (npi) DO UPDATE SET
        legal_name = excluded.legal_name,
        name_variations = excluded.name_variations,
        data_source_urls = CASE
            WHEN excluded.data_source_urls != '[]' THEN excluded.data_source_urls
            ELSE providers.data_source_urls
        END,
        last_updated = excluded.last_updated
    RETURNING id
"#;

pub const DELETE_PROVIDER: &str = "DELETE FROM providers WHERE id = ?";

pub const INSERT_HISTORY: &str = r#"
    INSERT INTO provider_history (
        id, provider_id, change_kind, field_name,
        old_value, new_value, effective_date,
        source, notes, recorded_at, recorded_by
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

pub const SELECT_HISTORY: &str = r#"
    SELECT * FROM provider_history
    WHERE provider_id = ?
    ORDER BY effective_date DESC, recorded_at DESC
"#;

pub const SELECT_NAME_HISTORY: &str = r#"
    SELECT * FROM provider_history
    WHERE provider_id = ?
      AND change_kind IN ('name_change', 'dba_change', 'rebranding')
    ORDER BY effective_date DESC
"#;

pub const SELECT_OWNER_HISTORY: &str = r#"
    SELECT * FROM provider_history
    WHERE provider_id = ?
      AND change_kind IN ('ownership_change', 'acquisition', 'merger', 'franchise_sale')
    ORDER BY effective_date DESC
"#;

pub const INSERT_SEARCH_LOG: &str = r#"
    INSERT INTO search_history (
        id, provider_id, search_query, search_location,
        match_found, match_kind, match_score, logged_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

pub const SELECT_STATS: &str = r#"
    SELECT
        COUNT(*) AS total_providers,
        COUNT(DISTINCT address_state) AS states_covered,
        COUNT(npi) AS with_npi,
        COALESCE(AVG(confidence_score), 0.0) AS avg_confidence
    FROM providers
"#;

/// Build an FTS5 MATCH expression from free text. Each token is quoted so
/// user punctuation cannot change the query syntax. Returns None when the
/// text has no searchable tokens.
pub fn fts_match_expr(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();

    if tokens.is_empty() { None } else { Some(tokens.join(" ")) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_expr_quotes_tokens() {
        assert_eq!(
            fts_match_expr("Home Instead"),
            Some("\"Home\" \"Instead\"".to_string())
        );
        assert_eq!(
            fts_match_expr("O'Brien & Sons, Inc."),
            Some("\"OBrien\" \"Sons\" \"Inc\"".to_string())
        );
        assert_eq!(fts_match_expr("  ?!  "), None);
    }
}
