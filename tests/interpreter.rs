// tests/interpreter.rs
// The interpretation contract, exercised through both engines.

mod common;

use common::ScriptedCompletion;
use provider_research::interpreter::{Intent, QueryInterpreter};
use provider_research::session::{Session, UserContext};

fn session_in(location: &str) -> Session {
    Session::new(UserContext {
        location: Some(location.to_string()),
        previous_searches: Vec::new(),
    })
}

#[tokio::test]
async fn explicit_location_wins_over_user_location() {
    let interpreter = QueryInterpreter::rule_based();
    let session = session_in("New York, NY");

    let parsed = interpreter
        .interpret("Find Home Instead in Boston, MA", &session)
        .await;

    assert_eq!(parsed.intent, Intent::Search);
    assert_eq!(parsed.providers.len(), 1);
    assert_eq!(parsed.providers[0].name, "Home Instead");
    assert_eq!(parsed.filters.state.as_deref(), Some("MA"));
    assert!(parsed.clarification_needed.is_none());
}

#[tokio::test]
async fn pronoun_resolution_scans_conversation_backwards() {
    let interpreter = QueryInterpreter::rule_based();
    let mut session = session_in("Boston, MA");
    session.push_user_turn("Find Home Instead in Boston");
    session.push_assistant_turn("Found 1 provider: Home Instead - Metrowest");

    let parsed = interpreter
        .interpret("What about their other locations?", &session)
        .await;

    let resolved = parsed
        .resolved_references
        .get("their")
        .expect("pronoun resolved");
    assert!(resolved.contains("Home Instead"));
}

#[tokio::test]
async fn deictic_reference_uses_last_result() {
    let interpreter = QueryInterpreter::rule_based();
    let mut session = session_in("Boston, MA");
    session.set_last_result(serde_json::json!({
        "legal_name": "Home Instead - Metrowest",
        "address_city": "Framingham",
    }));

    let parsed = interpreter.interpret("Add that to the database", &session).await;

    assert_eq!(parsed.intent, Intent::Add);
    assert_eq!(parsed.providers[0].name, "Home Instead - Metrowest");
    assert_eq!(
        parsed.resolved_references.get("that").map(String::as_str),
        Some("Home Instead - Metrowest")
    );
}

#[tokio::test]
async fn model_engine_honors_the_same_contract() {
    let response = r#"{
        "intent": "compare",
        "providers": [
            {"name": "Comfort Keepers", "location": "Detroit, MI"},
            {"name": "Visiting Angels", "location": "Detroit, MI"}
        ],
        "filters": {"state": "Michigan", "city": "Detroit"},
        "resolved_references": {},
        "multi_step_plan": ["Step 1: search both", "Step 2: compare"],
        "clarification_needed": null,
        "confidence": 0.92
    }"#;
    let client = ScriptedCompletion::new(vec![response]);
    let interpreter = QueryInterpreter::new(Some(client.clone()));

    let parsed = interpreter
        .interpret("Compare Comfort Keepers vs Visiting Angels in Detroit", &session_in("Detroit, MI"))
        .await;

    assert_eq!(client.calls(), 1);
    assert_eq!(parsed.intent, Intent::Compare);
    assert_eq!(parsed.providers.len(), 2);
    // Full state names are normalized to codes on the way out.
    assert_eq!(parsed.filters.state.as_deref(), Some("MI"));
}

#[tokio::test]
async fn malformed_model_output_falls_back_to_rules() {
    let client = ScriptedCompletion::new(vec!["I could not produce JSON, sorry."]);
    let interpreter = QueryInterpreter::new(Some(client.clone()));

    let parsed = interpreter
        .interpret("Find Home Instead in Boston, MA", &session_in("Boston, MA"))
        .await;

    assert_eq!(client.calls(), 1);
    // The rule engine still produced the right interpretation.
    assert_eq!(parsed.intent, Intent::Search);
    assert_eq!(parsed.providers[0].name, "Home Instead");
    assert_eq!(parsed.filters.state.as_deref(), Some("MA"));
}

#[tokio::test]
async fn ambiguous_query_requests_clarification() {
    let interpreter = QueryInterpreter::rule_based();

    let parsed = interpreter
        .interpret("find something good", &session_in("Boston, MA"))
        .await;

    assert!(parsed.clarification_needed.is_some());
    assert!(parsed.providers.is_empty());
    assert!(parsed.confidence <= 0.5);
}
