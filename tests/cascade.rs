// tests/cascade.rs
// Orchestrator behavior: short-circuiting, stage fallthrough, auto-save
// deduplication, and error containment.

mod common;

use common::{StubFetcher, StubSearcher, memory_store, orchestrator, provider};
use provider_research::orchestrator::CascadeStage;
use provider_research::session::{Session, UserContext};
use provider_research::store::SearchQuery;

fn session_in(location: &str) -> Session {
    Session::new(UserContext {
        location: Some(location.to_string()),
        previous_searches: Vec::new(),
    })
}

const LOCATIONS_PAGE: &str = r#"
    <html><body>
    <h1>Our Locations</h1>
    <p>Home Instead of Boston, 123 Main St, Boston, MA 02101 (617) 555-0100</p>
    </body></html>
"#;

#[tokio::test]
async fn confident_store_hit_short_circuits_expensive_stages() {
    let store = memory_store().await;
    let mut p = provider("Home Instead", "Boston", "MA");
    p.npi = Some("1234567890".to_string());
    store.add(&p).await.unwrap();

    let searcher = StubSearcher::new(vec!["https://example.com/locations"]);
    let fetcher = StubFetcher::new(vec![("https://example.com/locations", LOCATIONS_PAGE)]);
    let orch = orchestrator(store, searcher.clone(), fetcher.clone(), false);

    let mut session = session_in("New York, NY");
    let result = orch.process("Find Home Instead in Boston, MA", &mut session).await;

    assert!(result.success);
    assert_eq!(result.stage, CascadeStage::DatabaseHit);
    assert!(result.confidence >= 0.85);
    // Semantic matching and web research never ran.
    assert_eq!(searcher.calls(), 0);
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(result.token_usage.matcher, 0);
    assert_eq!(result.token_usage.researcher, 0);
}

#[tokio::test]
async fn weak_store_hit_proceeds_to_semantic_matching() {
    let store = memory_store().await;
    store.add(&provider("Evergreen Home Care", "Detroit", "MI")).await.unwrap();

    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher.clone(), fetcher, false);

    // The store can only fuzzy-match this regional variant, at weak
    // confidence; the semantic matcher recognizes the stored legal name
    // inside the query and resolves it.
    let mut session = session_in("Detroit, MI");
    let result = orch
        .process("Find Evergreen Home Care of Greater Detroit in Michigan", &mut session)
        .await;

    assert!(result.success, "warnings: {:?}", result.warnings);
    assert_eq!(result.stage, CascadeStage::SemanticMatch);
    assert!(result.confidence >= 0.8);
    assert!(result.token_usage.matcher > 0);
    // The cascade stopped before web research.
    assert_eq!(searcher.calls(), 0);
}

#[tokio::test]
async fn unmatched_query_escalates_to_web_research() {
    let store = memory_store().await;

    let searcher = StubSearcher::new(vec!["https://example.com/locations"]);
    let fetcher = StubFetcher::new(vec![("https://example.com/locations", LOCATIONS_PAGE)]);
    let orch = orchestrator(store, searcher.clone(), fetcher.clone(), false);

    let mut session = session_in("Boston, MA");
    let result = orch
        .process("Find Home Instead in Boston, MA", &mut session)
        .await;

    assert!(result.success, "warnings: {:?}", result.warnings);
    assert_eq!(result.stage, CascadeStage::WebResearch);
    assert_eq!(searcher.calls(), 1);
    assert_eq!(fetcher.calls(), 1);
    assert!(result.token_usage.researcher > 0);
    assert!(!result.providers.is_empty());
}

#[tokio::test]
async fn auto_save_persists_researched_locations_once() {
    let store = memory_store().await;

    let searcher = StubSearcher::new(vec!["https://example.com/locations"]);
    let fetcher = StubFetcher::new(vec![("https://example.com/locations", LOCATIONS_PAGE)]);
    let orch = orchestrator(store.clone(), searcher, fetcher, true);

    let mut session = session_in("Boston, MA");
    let result = orch
        .process("Find Home Instead in Boston, MA", &mut session)
        .await;
    assert!(result.success);
    assert_eq!(result.stage, CascadeStage::WebResearch);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_providers, 1);

    // Running the same research again must not duplicate the record: the
    // phone number identifies it as already stored.
    let searcher = StubSearcher::new(vec!["https://example.com/locations"]);
    let fetcher = StubFetcher::new(vec![("https://example.com/locations", LOCATIONS_PAGE)]);
    let orch = orchestrator(store.clone(), searcher, fetcher, true);

    // The store hit now answers directly; force the research path by
    // querying a name the store cannot resolve but research will.
    let hits = store
        .search(&SearchQuery {
            phone: Some("(617) 555-0100".to_string()),
            ..SearchQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let mut session = session_in("Boston, MA");
    let _ = orch
        .process("Find Golden Years Helpers in Boston, MA", &mut session)
        .await;

    let stats = store.stats().await.unwrap();
    // The researched page still describes the same phone number, so no
    // second record appears for it.
    assert_eq!(stats.total_providers, 1);
}

#[tokio::test]
async fn missing_provider_yields_clarification_not_a_guess() {
    let store = memory_store().await;
    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher, fetcher, false);

    let mut session = session_in("Boston, MA");
    let result = orch.process("find the nearest one", &mut session).await;

    assert!(!result.success);
    assert_eq!(result.stage, CascadeStage::Clarification);
    assert!(result.clarification_question.is_some());
}

#[tokio::test]
async fn compare_requires_two_providers() {
    let store = memory_store().await;
    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher, fetcher, false);

    let mut session = session_in("Detroit, MI");
    let result = orch
        .process("Compare Comfort Keepers vs Visiting Angels in Detroit", &mut session)
        .await;

    assert_eq!(result.stage, CascadeStage::MultiStep);
    assert!(result.success);

    let mut session = session_in("Detroit, MI");
    let result = orch.process("Compare Comfort Keepers", &mut session).await;
    assert!(!result.success);
    assert!(result.clarification_question.is_some());
}

#[tokio::test]
async fn list_without_state_asks_for_one() {
    let store = memory_store().await;
    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher, fetcher, false);

    let mut session = Session::default();
    let result = orch.process("list all providers", &mut session).await;

    assert!(!result.success);
    assert_eq!(result.stage, CascadeStage::Clarification);
}

#[tokio::test]
async fn pronoun_followup_resolves_from_previous_turn() {
    let store = memory_store().await;
    let mut p = provider("Home Instead - Metrowest", "Framingham", "MA");
    p.npi = Some("1234567890".to_string());
    store.add(&p).await.unwrap();

    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher, fetcher, false);

    let mut session = session_in("Boston, MA");
    let first = orch.process("Find Home Instead in Framingham, MA", &mut session).await;
    assert!(first.success);

    let followup = orch.process("What about their other locations?", &mut session).await;
    assert_ne!(followup.stage, CascadeStage::Clarification);
    assert!(followup.steps_executed.iter().any(|s| s.contains("Home Instead")));
}

#[tokio::test]
async fn store_failure_is_contained_as_a_warning() {
    let store = memory_store().await;
    store.pool().close().await;

    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher, fetcher, false);

    let mut session = session_in("Boston, MA");
    let result = orch.process("Find Home Instead in Boston, MA", &mut session).await;

    assert!(!result.success);
    assert!(!result.warnings.is_empty());
    assert!(result.clarification_question.is_some());
}

#[tokio::test]
async fn research_with_no_sources_reports_failure_honestly() {
    let store = memory_store().await;
    let searcher = StubSearcher::new(vec![]);
    let fetcher = StubFetcher::new(vec![]);
    let orch = orchestrator(store, searcher.clone(), fetcher, false);

    let mut session = session_in("Boston, MA");
    let result = orch.process("Find Home Instead in Boston, MA", &mut session).await;

    assert!(!result.success);
    assert_eq!(result.stage, CascadeStage::WebResearch);
    assert_eq!(searcher.calls(), 1);
    assert!(result.message.contains("Could not find"));
}
