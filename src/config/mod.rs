// src/config/mod.rs
// All tunables come from the environment (.env supported), with defaults.

use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Model Configuration
    pub anthropic_base_url: String,
    pub model: String,
    pub model_max_tokens: u32,
    pub model_timeout: u64,

    // ── Web Research Configuration
    pub fetch_timeout: u64,
    pub fetch_max_retries: u32,
    pub fetch_delay_ms: u64,
    pub research_max_urls: usize,
    pub search_api_url: String,
    pub registry_api_url: String,

    // ── Cascade Thresholds
    pub store_confidence_threshold: f64,
    pub semantic_confidence_threshold: f64,
    pub semantic_match_threshold: f64,
    pub semantic_candidate_pool: i64,

    // ── Result Limits
    pub search_default_limit: i64,
    pub list_limit: i64,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Tolerate trailing comments and whitespace in .env values
            let clean = val.split('#').next().unwrap_or("").trim();
            clean.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env_var_or("DATABASE_URL", "sqlite:./providers.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 5),
            anthropic_base_url: env_var_or(
                "ANTHROPIC_BASE_URL",
                "https://api.anthropic.com".to_string(),
            ),
            model: env_var_or("PROVIDER_RESEARCH_MODEL", "claude-sonnet-4-20250514".to_string()),
            model_max_tokens: env_var_or("PROVIDER_RESEARCH_MODEL_MAX_TOKENS", 2000),
            model_timeout: env_var_or("PROVIDER_RESEARCH_MODEL_TIMEOUT", 60),
            fetch_timeout: env_var_or("PROVIDER_RESEARCH_FETCH_TIMEOUT", 30),
            fetch_max_retries: env_var_or("PROVIDER_RESEARCH_FETCH_RETRIES", 2),
            fetch_delay_ms: env_var_or("PROVIDER_RESEARCH_FETCH_DELAY_MS", 1000),
            research_max_urls: env_var_or("PROVIDER_RESEARCH_MAX_URLS", 5),
            search_api_url: env_var_or(
                "PROVIDER_RESEARCH_SEARCH_API_URL",
                "https://api.search.brave.com/res/v1/web/search".to_string(),
            ),
            registry_api_url: env_var_or(
                "PROVIDER_RESEARCH_REGISTRY_API_URL",
                "https://npiregistry.cms.hhs.gov/api/".to_string(),
            ),
            store_confidence_threshold: env_var_or("PROVIDER_RESEARCH_STORE_THRESHOLD", 0.85),
            semantic_confidence_threshold: env_var_or("PROVIDER_RESEARCH_SEMANTIC_THRESHOLD", 0.8),
            semantic_match_threshold: env_var_or("PROVIDER_RESEARCH_MATCH_THRESHOLD", 0.7),
            semantic_candidate_pool: env_var_or("PROVIDER_RESEARCH_CANDIDATE_POOL", 50),
            search_default_limit: env_var_or("PROVIDER_RESEARCH_SEARCH_LIMIT", 10),
            list_limit: env_var_or("PROVIDER_RESEARCH_LIST_LIMIT", 100),
            log_level: env_var_or("PROVIDER_RESEARCH_LOG_LEVEL", "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
