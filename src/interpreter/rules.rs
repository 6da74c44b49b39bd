// src/interpreter/rules.rs
// Deterministic interpretation engine. Also the fallback when model output
// cannot be parsed, so it must produce the same contract shape.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{Intent, ParsedQuery, ProviderMention, QueryFilters};
use crate::session::{Role, Session};
use crate::store::validate::normalize_state;

/// Brand name patterns recognized without model help. Matched against
/// lowercased text, whole tokens only where the name is short.
static BRAND_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"home instead",
        r"comfort keepers?",
        r"\bck\b",
        r"visiting angels?",
        r"brightstar care",
        r"gcp reit",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("brand pattern"))
    .collect()
});

static CITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bin ([A-Z][a-z]+(?: [A-Z][a-z]+)*)").expect("city pattern"));

static STATE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2})\b").expect("state pattern"));

static NAMED_TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:find|search for|look for|locate|research|verify|add)\s+(.+)$")
        .expect("target pattern")
});

pub fn interpret(query: &str, session: &Session) -> ParsedQuery {
    let query_lower = query.to_lowercase();

    let intent = detect_intent(&query_lower);
    let mut providers = extract_brands(&query_lower);
    let mut filters = extract_location(query);
    let mut resolved_references = BTreeMap::new();

    // "near me" / "local" resolve from the caller-supplied location, never
    // from conversation history.
    if query_lower.contains("near me") || query_lower.contains("local") {
        if let Some(location) = &session.user_context.location {
            resolved_references.insert("near me".to_string(), location.clone());
            if let Some((city, state)) = split_location(location) {
                filters.city.get_or_insert(city);
                filters.state.get_or_insert(state);
            }
        }
    }

    // Pronouns resolve to the most recently mentioned provider, scanning
    // the conversation backwards.
    if ["their", "they", "them"].iter().any(|w| contains_word(&query_lower, w)) {
        if let Some(name) = last_mentioned_provider(session) {
            resolved_references.insert("their".to_string(), name.clone());
            if providers.is_empty() {
                providers.push(ProviderMention::named(name));
            }
        }
    }

    // "that" / "this" / "it" resolve against the last processed result.
    if ["that", "this", "it"].iter().any(|w| contains_word(&query_lower, w)) {
        if let Some(name) = last_result_name(session) {
            resolved_references.insert("that".to_string(), name.clone());
            if providers.is_empty() && intent.requires_provider() {
                providers.push(ProviderMention::named(name));
            }
        }
    }

    // Generic "<verb> <name>" extraction when no known brand matched.
    if providers.is_empty() {
        if let Some(name) = extract_named_target(query) {
            providers.push(ProviderMention::named(name));
        }
    }

    let multi_step_plan = if intent == Intent::Compare && providers.len() >= 2 {
        vec![
            format!("Search for {}", providers[0].name),
            format!("Search for {}", providers[1].name),
            "Compare locations, coverage, and ownership".to_string(),
        ]
    } else {
        Vec::new()
    };

    // Never guess a provider: ask instead.
    let clarification_needed = if providers.is_empty() && intent.requires_provider() {
        Some("Which provider are you looking for?".to_string())
    } else if intent == Intent::List && filters.state.is_none() {
        Some("Which state would you like me to search in?".to_string())
    } else {
        None
    };

    let confidence = if providers.is_empty() { 0.5 } else { 0.9 };

    ParsedQuery {
        intent,
        providers,
        filters,
        resolved_references,
        multi_step_plan,
        clarification_needed,
        confidence,
    }
}

fn detect_intent(query_lower: &str) -> Intent {
    let has = |words: &[&str]| words.iter().any(|w| query_lower.contains(w));

    if has(&["find", "search", "look for", "locate", "where is"]) {
        Intent::Search
    } else if has(&["add", "insert", "save", "store"]) {
        Intent::Add
    } else if has(&["compare", " vs ", "versus", "difference"]) {
        Intent::Compare
    } else if has(&["list", "show all", "how many"]) {
        Intent::List
    } else if has(&["update", "correct the", "change the"]) {
        Intent::Update
    } else if has(&["delete", "remove"]) {
        Intent::Delete
    } else if has(&["research", "investigate", "deep dive"]) {
        Intent::Research
    } else if has(&["verify", "validate", "confirm"]) {
        Intent::Verify
    } else if has(&["related", "relationship", "connected"]) {
        Intent::Relate
    } else {
        Intent::Search
    }
}

fn extract_brands(query_lower: &str) -> Vec<ProviderMention> {
    let mut providers = Vec::new();
    for pattern in BRAND_PATTERNS.iter() {
        if let Some(m) = pattern.find(query_lower) {
            let name = canonical_brand(m.as_str());
            if !providers.iter().any(|p: &ProviderMention| p.name == name) {
                providers.push(ProviderMention::named(name));
            }
        }
    }
    providers
}

fn canonical_brand(matched: &str) -> String {
    match matched {
        "ck" => "Comfort Keepers".to_string(),
        other => title_case(other),
    }
}

fn extract_location(query: &str) -> QueryFilters {
    let mut filters = QueryFilters::default();

    if let Some(caps) = CITY_RE.captures(query) {
        let place = caps[1].to_string();
        // "in Massachusetts" names a state, not a city.
        match normalize_state(&place) {
            Some(code) => filters.state = Some(code.to_string()),
            None => filters.city = Some(place),
        }
    }

    for caps in STATE_CODE_RE.captures_iter(query) {
        if let Some(code) = normalize_state(&caps[1]) {
            filters.state = Some(code.to_string());
            break;
        }
    }

    filters
}

fn extract_named_target(query: &str) -> Option<String> {
    let caps = NAMED_TARGET_RE.captures(query)?;
    let mut target = caps[1].trim().to_string();

    // Cut the location tail and trailing punctuation.
    for separator in [" in ", " near ", " at ", " around "] {
        if let Some(pos) = target.to_lowercase().find(separator) {
            target.truncate(pos);
        }
    }
    let target = target
        .trim()
        .trim_end_matches(['.', '?', '!', ','])
        .trim_start_matches("a ")
        .trim_start_matches("the ")
        .trim()
        .to_string();

    // Only accept something that looks like a proper name; lowercase
    // leftovers ("the nearest one") are not a provider.
    let proper = target.chars().next().is_some_and(|c| c.is_uppercase());
    let lower = target.to_lowercase();
    let unusable = !proper
        || target.len() < 2
        || ["their", "them", "that", "this", "it", "me"].contains(&lower.as_str());
    if unusable { None } else { Some(target) }
}

fn last_mentioned_provider(session: &Session) -> Option<String> {
    for turn in session.conversation.iter().rev() {
        if turn.role != Role::Assistant {
            continue;
        }
        let content_lower = turn.content.to_lowercase();
        for pattern in BRAND_PATTERNS.iter() {
            if let Some(m) = pattern.find(&content_lower) {
                return Some(canonical_brand(m.as_str()));
            }
        }
    }
    None
}

fn last_result_name(session: &Session) -> Option<String> {
    let result = session.last_result.as_ref()?;
    result
        .get("legal_name")
        .or_else(|| result.get("name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn split_location(location: &str) -> Option<(String, String)> {
    let (city, state) = location.split_once(',')?;
    let code = normalize_state(state.trim())?;
    Some((city.trim().to_string(), code.to_string()))
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|t| t == word)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UserContext;

    fn session_at(location: &str) -> Session {
        Session::new(UserContext {
            location: Some(location.to_string()),
            previous_searches: Vec::new(),
        })
    }

    #[test]
    fn explicit_location_beats_user_context() {
        let parsed = interpret("Find Home Instead in Boston, MA", &session_at("New York, NY"));

        assert_eq!(parsed.intent, Intent::Search);
        assert_eq!(parsed.providers.len(), 1);
        assert_eq!(parsed.providers[0].name, "Home Instead");
        assert_eq!(parsed.filters.state.as_deref(), Some("MA"));
        assert!(parsed.clarification_needed.is_none());
    }

    #[test]
    fn near_me_uses_caller_context() {
        let parsed = interpret("Find Comfort Keepers near me", &session_at("Detroit, MI"));

        assert_eq!(parsed.filters.city.as_deref(), Some("Detroit"));
        assert_eq!(parsed.filters.state.as_deref(), Some("MI"));
        assert_eq!(
            parsed.resolved_references.get("near me").map(String::as_str),
            Some("Detroit, MI")
        );
    }

    #[test]
    fn pronoun_resolves_from_conversation() {
        let mut session = session_at("Boston, MA");
        session.push_user_turn("Find Home Instead in Boston");
        session.push_assistant_turn("Found Home Instead - Metrowest at 123 Main St");

        let parsed = interpret("What about their other locations?", &session);

        let resolved = parsed.resolved_references.get("their").unwrap();
        assert!(resolved.contains("Home Instead"));
        assert_eq!(parsed.providers[0].name, "Home Instead");
    }

    #[test]
    fn missing_provider_asks_instead_of_guessing() {
        let parsed = interpret("Find the nearest one", &session_at("Boston, MA"));
        assert!(parsed.clarification_needed.is_some());
    }

    #[test]
    fn state_name_is_not_a_city() {
        let parsed = interpret("Find Visiting Angels in Massachusetts", &session_at("Boston, MA"));
        assert_eq!(parsed.filters.state.as_deref(), Some("MA"));
        assert!(parsed.filters.city.is_none());
    }

    #[test]
    fn abbreviation_brand() {
        let parsed = interpret("Find CK in Michigan", &session_at("Detroit, MI"));
        assert_eq!(parsed.providers[0].name, "Comfort Keepers");
        assert_eq!(parsed.filters.state.as_deref(), Some("MI"));
    }

    #[test]
    fn compare_builds_a_plan() {
        let parsed = interpret(
            "Compare Comfort Keepers vs Visiting Angels in Detroit",
            &session_at("Detroit, MI"),
        );
        assert_eq!(parsed.intent, Intent::Compare);
        assert_eq!(parsed.providers.len(), 2);
        assert_eq!(parsed.multi_step_plan.len(), 3);
    }
}
