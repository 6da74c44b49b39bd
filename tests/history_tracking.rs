// tests/history_tracking.rs

mod common;

use chrono::{TimeZone, Utc};
use common::{memory_store, provider};
use provider_research::store::{
    ChangeDetails, ChangeKind, ProviderField, SearchQuery, StoreError,
};
use uuid::Uuid;

#[tokio::test]
async fn change_updates_field_and_appends_exactly_one_entry() {
    let store = memory_store().await;
    let id = store.add(&provider("Home Instead", "Boston", "MA")).await.unwrap();

    let entry = store
        .record_change(
            id,
            ProviderField::LegalName,
            "Home Instead Senior Care",
            &ChangeDetails::new(ChangeKind::NameChange, "state_filing"),
        )
        .await
        .unwrap();

    assert_eq!(entry.old_value.as_deref(), Some("Home Instead"));
    assert_eq!(entry.new_value.as_deref(), Some("Home Instead Senior Care"));

    let record = store.get(id).await.unwrap().unwrap();
    assert_eq!(record.legal_name, "Home Instead Senior Care");

    let history = store.get_history(id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn history_is_append_only_across_many_changes() {
    let store = memory_store().await;
    let id = store.add(&provider("Home Instead", "Boston", "MA")).await.unwrap();

    for i in 0..5 {
        store
            .record_change(
                id,
                ProviderField::ParentOrganization,
                &format!("Owner {i}"),
                &ChangeDetails::new(ChangeKind::OwnershipChange, "news_archive"),
            )
            .await
            .unwrap();
    }

    let history = store.get_history(id).await.unwrap();
    assert_eq!(history.len(), 5);

    // Every prior value survives; nothing was overwritten.
    let old_values: Vec<Option<&str>> =
        history.iter().map(|e| e.old_value.as_deref()).collect();
    assert!(old_values.contains(&None)); // the initial empty parent
    assert!(old_values.contains(&Some("Owner 0")));
    assert!(old_values.contains(&Some("Owner 3")));
}

#[tokio::test]
async fn previous_names_and_owners_come_from_history() {
    let store = memory_store().await;
    let id = store.add(&provider("Sunrise Care LLC", "Boston", "MA")).await.unwrap();

    let date = Utc.with_ymd_and_hms(2020, 6, 15, 0, 0, 0).unwrap();
    store
        .record_change(
            id,
            ProviderField::LegalName,
            "Home Instead - Metrowest",
            &ChangeDetails {
                change_kind: ChangeKind::NameChange,
                effective_date: Some(date),
                source: "business_journal".to_string(),
                notes: Some("rebranded after franchise purchase".to_string()),
                recorded_by: None,
            },
        )
        .await
        .unwrap();
    store
        .record_change(
            id,
            ProviderField::ParentOrganization,
            "Honor Technology",
            &ChangeDetails::new(ChangeKind::Acquisition, "news_archive"),
        )
        .await
        .unwrap();

    let names = store.previous_names(id).await.unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].name, "Sunrise Care LLC");
    assert_eq!(names[0].effective_date, date);

    // The freshly created record had no parent, so there is no previous
    // owner value to report.
    let owners = store.previous_owners(id).await.unwrap();
    assert!(owners.is_empty());

    store
        .record_change(
            id,
            ProviderField::ParentOrganization,
            "Someone Else Entirely",
            &ChangeDetails::new(ChangeKind::FranchiseSale, "news_archive"),
        )
        .await
        .unwrap();

    let owners = store.previous_owners(id).await.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].owner, "Honor Technology");
}

#[tokio::test]
async fn phone_change_keeps_lookup_working() {
    let store = memory_store().await;
    let mut p = provider("Home Instead", "Boston", "MA");
    p.phone = Some("(617) 555-0100".to_string());
    let id = store.add(&p).await.unwrap();

    store
        .record_change(
            id,
            ProviderField::Phone,
            "(617) 555-0999",
            &ChangeDetails::new(ChangeKind::Other, "user_input"),
        )
        .await
        .unwrap();

    let hits = store
        .search(&SearchQuery {
            phone: Some("617-555-0999".to_string()),
            ..SearchQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let stale = store
        .search(&SearchQuery {
            phone: Some("617-555-0100".to_string()),
            ..SearchQuery::default()
        })
        .await
        .unwrap();
    assert!(stale.is_empty());
}

#[tokio::test]
async fn imported_events_do_not_touch_current_fields() {
    let store = memory_store().await;
    let id = store.add(&provider("Home Instead", "Boston", "MA")).await.unwrap();

    store
        .append_history(
            id,
            "parent_organization",
            Some("Previous Owner LLC"),
            Some("New Owner Inc"),
            &ChangeDetails::new(ChangeKind::FranchiseSale, "web_research"),
        )
        .await
        .unwrap();

    let record = store.get(id).await.unwrap().unwrap();
    assert!(record.parent_organization.is_none());

    let owners = store.previous_owners(id).await.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].owner, "Previous Owner LLC");
}

#[tokio::test]
async fn direct_updates_leave_no_history() {
    let store = memory_store().await;
    let id = store.add(&provider("Home Instead", "Boston", "MA")).await.unwrap();

    store
        .update_field(id, ProviderField::Website, "https://homeinstead.example")
        .await
        .unwrap();

    let record = store.get(id).await.unwrap().unwrap();
    assert_eq!(record.website.as_deref(), Some("https://homeinstead.example"));
    assert!(store.get_history(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn changes_to_unknown_providers_fail() {
    let store = memory_store().await;

    let result = store
        .record_change(
            Uuid::new_v4(),
            ProviderField::LegalName,
            "Anything",
            &ChangeDetails::new(ChangeKind::NameChange, "user_input"),
        )
        .await;

    assert!(matches!(result, Err(StoreError::NotFound(_))));
}
