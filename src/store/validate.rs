// src/store/validate.rs

//! Field validation and normalization for provider data.

use super::StoreError;

pub const STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC", "PR", "VI", "GU", "AS", "MP",
];

const STATE_NAMES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
    ("district of columbia", "DC"),
];

/// Strip everything but digits. Used for phone comparison everywhere.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Map a state name or code to its two-letter code.
pub fn normalize_state(state: &str) -> Option<&'static str> {
    let trimmed = state.trim();
    if trimmed.len() == 2 {
        let upper = trimmed.to_ascii_uppercase();
        return STATE_CODES.iter().find(|c| **c == upper).copied();
    }
    let lower = trimmed.to_ascii_lowercase();
    STATE_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| *code)
}

/// Registry identifiers are exactly 10 digits.
pub fn validate_npi(npi: &str) -> Result<(), StoreError> {
    let digits = normalize_phone(npi);
    if digits.len() != 10 {
        return Err(StoreError::Validation {
            field: "npi",
            message: format!("must be exactly 10 digits, got {}", digits.len()),
        });
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), StoreError> {
    let digits = normalize_phone(phone);
    if !(10..=11).contains(&digits.len()) {
        return Err(StoreError::Validation {
            field: "phone",
            message: format!("must be 10-11 digits, got {}", digits.len()),
        });
    }
    Ok(())
}

pub fn validate_state(state: &str) -> Result<(), StoreError> {
    normalize_state(state).map(|_| ()).ok_or_else(|| StoreError::Validation {
        field: "state",
        message: format!("unknown state code: {state}"),
    })
}

pub fn validate_zip(zip: &str) -> Result<(), StoreError> {
    let clean = zip.replace(' ', "");
    let plain = clean.len() == 5 && clean.chars().all(|c| c.is_ascii_digit());
    let plus4 = clean.len() == 10
        && clean.as_bytes()[5] == b'-'
        && clean[..5].chars().all(|c| c.is_ascii_digit())
        && clean[6..].chars().all(|c| c.is_ascii_digit());
    if plain || plus4 {
        Ok(())
    } else {
        Err(StoreError::Validation {
            field: "zip",
            message: format!("invalid zip code: {zip}"),
        })
    }
}

const CORPORATE_SUFFIXES: &[&str] = &[" Inc", " LLC", " Corp", " Corporation", " Ltd"];

/// Searchable lowercase variants of a legal name: the name itself plus the
/// name with common corporate suffixes stripped.
pub fn name_variations(legal_name: &str) -> Vec<String> {
    let mut variations = vec![legal_name.to_lowercase()];
    for suffix in CORPORATE_SUFFIXES {
        if let Some(stripped) = legal_name.strip_suffix(suffix) {
            let lowered = stripped.to_lowercase();
            if !variations.contains(&lowered) {
                variations.push(lowered);
            }
        }
        // Tolerate a trailing period, e.g. "Acme Inc."
        let dotted = format!("{suffix}.");
        if let Some(stripped) = legal_name.strip_suffix(&dotted) {
            let lowered = stripped.to_lowercase();
            if !variations.contains(&lowered) {
                variations.push(lowered);
            }
        }
    }
    variations
}
