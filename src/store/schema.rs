// src/store/schema.rs

//! Schema bootstrap for the provider store. Statements are idempotent and
//! run one at a time at startup.

pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS providers (
        id TEXT PRIMARY KEY,

        npi TEXT UNIQUE,
        legal_name TEXT NOT NULL,
        dba_names TEXT NOT NULL DEFAULT '[]',
        name_variations TEXT NOT NULL DEFAULT '[]',

        address_full TEXT,
        address_street TEXT,
        address_city TEXT,
        address_state TEXT,
        address_zip TEXT,

        phone TEXT,
        phone_normalized TEXT,
        fax TEXT,
        email TEXT,
        website TEXT,

        parent_organization TEXT,
        real_estate_owner TEXT,
        franchise_status INTEGER NOT NULL DEFAULT 0,
        franchise_id TEXT,
        provider_type TEXT,

        confidence_score REAL NOT NULL DEFAULT 0.0,
        data_source_urls TEXT NOT NULL DEFAULT '[]',
        raw_search_data TEXT,

        created_at TEXT NOT NULL,
        validated_at TEXT,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS provider_history (
        id TEXT PRIMARY KEY,
        provider_id TEXT NOT NULL REFERENCES providers(id),
        change_kind TEXT NOT NULL,
        field_name TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        effective_date TEXT NOT NULL,
        source TEXT NOT NULL,
        notes TEXT,
        recorded_at TEXT NOT NULL,
        recorded_by TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_history (
        id TEXT PRIMARY KEY,
        provider_id TEXT,
        search_query TEXT NOT NULL,
        search_location TEXT,
        match_found INTEGER NOT NULL,
        match_kind TEXT,
        match_score REAL,
        logged_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS providers_fts USING fts5(
        legal_name,
        parent_organization,
        content='providers',
        content_rowid='rowid'
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS providers_fts_insert AFTER INSERT ON providers BEGIN
        INSERT INTO providers_fts(rowid, legal_name, parent_organization)
        VALUES (new.rowid, new.legal_name, coalesce(new.parent_organization, ''));
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS providers_fts_delete AFTER DELETE ON providers BEGIN
        INSERT INTO providers_fts(providers_fts, rowid, legal_name, parent_organization)
        VALUES ('delete', old.rowid, old.legal_name, coalesce(old.parent_organization, ''));
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS providers_fts_update AFTER UPDATE ON providers BEGIN
        INSERT INTO providers_fts(providers_fts, rowid, legal_name, parent_organization)
        VALUES ('delete', old.rowid, old.legal_name, coalesce(old.parent_organization, ''));
        INSERT INTO providers_fts(rowid, legal_name, parent_organization)
        VALUES (new.rowid, new.legal_name, coalesce(new.parent_organization, ''));
    END
    "#,
    "CREATE INDEX IF NOT EXISTS idx_providers_npi ON providers(npi)",
    "CREATE INDEX IF NOT EXISTS idx_providers_legal_name ON providers(legal_name)",
    "CREATE INDEX IF NOT EXISTS idx_providers_city_state ON providers(address_city, address_state)",
    "CREATE INDEX IF NOT EXISTS idx_providers_state ON providers(address_state)",
    "CREATE INDEX IF NOT EXISTS idx_providers_phone ON providers(phone_normalized)",
    "CREATE INDEX IF NOT EXISTS idx_providers_parent ON providers(parent_organization)",
    "CREATE INDEX IF NOT EXISTS idx_provider_history_provider ON provider_history(provider_id)",
    "CREATE INDEX IF NOT EXISTS idx_search_history_query ON search_history(search_query)",
];
