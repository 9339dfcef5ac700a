use dashview_core::{
    CacheEntry, CatalogLevel, ConnectionCheck, ConnectionStatus, DataKey, ExplorerError,
    MetadataStore, SourceInfo,
};
use dashview_test_support::fixtures::{duckdb_catalog, mixed_health_catalog, postgres_catalog};
use dashview_test_support::{CatalogCall, FakeCatalog};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

fn store_for(catalog: &FakeCatalog) -> Arc<MetadataStore> {
    Arc::new(MetadataStore::new(catalog.clone().as_client_arc()))
}

#[tokio::test]
async fn concurrent_loads_share_one_fetch() {
    let catalog = postgres_catalog().with_latency(Duration::from_millis(20));
    let store = store_for(&catalog);

    join_all((0..5).map(|_| store.load_databases("pg"))).await;

    let stats = catalog.stats();
    assert_eq!(stats.call_count(&CatalogCall::databases("pg")), 1);

    // Every caller returns only after the entry has settled.
    let snapshot = store.snapshot();
    let databases = snapshot.databases("pg").and_then(CacheEntry::loaded).unwrap();
    assert_eq!(databases[0].name, "prod");
    assert!(snapshot.loading_slots().is_empty());
}

#[tokio::test]
async fn settled_entries_are_never_refetched() {
    let catalog = postgres_catalog();
    let store = store_for(&catalog);

    store.load_sources().await;
    store.load_databases("pg").await;
    store.load_schemas("pg", "prod").await;

    store.load_sources().await;
    store.load_databases("pg").await;
    store.load_schemas("pg", "prod").await;

    let stats = catalog.stats();
    assert_eq!(stats.call_count(&CatalogCall::Sources), 1);
    assert_eq!(stats.call_count(&CatalogCall::databases("pg")), 1);
    assert_eq!(stats.call_count(&CatalogCall::schemas("pg", "prod")), 1);
}

#[tokio::test]
async fn failures_are_cached_and_not_retried() {
    let catalog = FakeCatalog::new().with_rejection(CatalogCall::databases("pg"), "boom");
    let store = store_for(&catalog);

    store.load_databases("pg").await;
    store.load_databases("pg").await;

    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("pg")), 1);
    assert_eq!(
        store.snapshot().databases("pg"),
        Some(&CacheEntry::Failed("boom".to_string()))
    );
}

#[tokio::test]
async fn error_payload_is_stored_as_failure() {
    let catalog = FakeCatalog::new()
        .with_error_payload(CatalogCall::tables("pg", "prod", Some("public")), "denied");
    let store = store_for(&catalog);

    store.load_tables("pg", "prod", Some("public")).await;

    let snapshot = store.snapshot();
    let entry = snapshot.tables("pg", "prod", Some("public")).unwrap();
    assert_eq!(entry.error(), Some("denied"));
}

#[tokio::test]
async fn schema_listing_records_topology() {
    let pg = postgres_catalog();
    let duck = duckdb_catalog();
    let pg_store = store_for(&pg);
    let duck_store = store_for(&duck);

    assert_eq!(pg_store.has_schemas("pg", "prod"), None);

    pg_store.load_schemas("pg", "prod").await;
    duck_store.load_schemas("duck", "main").await;

    assert_eq!(pg_store.has_schemas("pg", "prod"), Some(true));
    assert_eq!(duck_store.has_schemas("duck", "main"), Some(false));

    let snapshot = duck_store.snapshot();
    let listing = snapshot
        .schemas("duck", "main")
        .and_then(CacheEntry::loaded)
        .unwrap();
    assert!(listing.schemas.is_empty());
}

#[tokio::test]
async fn unreachable_source_marks_connection_failed() {
    let catalog = FakeCatalog::new()
        .with_sources(vec![SourceInfo::new("pg", "postgresql")])
        .with_unreachable_source("pg", "connection refused");
    let store = store_for(&catalog);

    store.load_sources().await;
    store.load_databases("pg").await;

    let snapshot = store.snapshot();
    let connection = snapshot.connection("pg").unwrap();
    assert_eq!(connection.status, ConnectionStatus::ConnectionFailed);
    assert_eq!(connection.error.as_deref(), Some("connection refused"));
    assert_eq!(
        snapshot.databases("pg").and_then(CacheEntry::error),
        Some("connection refused")
    );
}

#[tokio::test]
async fn known_failed_source_skips_database_fetch() {
    let catalog = mixed_health_catalog();
    let store = store_for(&catalog);

    store.load_sources().await;
    store.load_databases("broken").await;
    store.load_databases("ok").await;

    let stats = catalog.stats();
    assert_eq!(stats.call_count(&CatalogCall::databases("broken")), 0);
    assert_eq!(stats.call_count(&CatalogCall::databases("ok")), 1);
    assert!(store.snapshot().databases("broken").is_none());
}

#[tokio::test]
async fn test_connection_updates_only_connection_state() {
    let catalog = mixed_health_catalog()
        .with_connection_check("broken", ConnectionCheck::connected());
    let store = store_for(&catalog);

    store.load_sources().await;
    let before = store.snapshot();

    let broken = before.sources().and_then(CacheEntry::loaded).unwrap()[0].clone();
    store.test_connection(&broken.config()).await;

    let after = store.snapshot();
    assert_eq!(
        after.connection("broken").map(|c| c.status),
        Some(ConnectionStatus::Connected)
    );
    assert_eq!(after.sources(), before.sources());
    assert!(after.databases("broken").is_none());

    // Connection tests are never cached.
    store.test_connection(&broken.config()).await;
    assert_eq!(
        catalog
            .stats()
            .call_count(&CatalogCall::test_connection("broken")),
        2
    );
}

#[tokio::test]
async fn rejected_connection_test_marks_source_failed() {
    let catalog = postgres_catalog()
        .with_rejection(CatalogCall::test_connection("pg"), "host unreachable");
    let store = store_for(&catalog);

    store.load_sources().await;
    store
        .test_connection(&SourceInfo::new("pg", "postgresql").config())
        .await;

    let snapshot = store.snapshot();
    let connection = snapshot.connection("pg").unwrap();
    assert!(connection.is_failed());
    assert_eq!(connection.error.as_deref(), Some("host unreachable"));
}

#[tokio::test]
async fn slow_fetch_times_out_into_failure() {
    let catalog = postgres_catalog()
        .with_call_latency(CatalogCall::databases("pg"), Duration::from_millis(500));
    let store = Arc::new(
        MetadataStore::new(catalog.clone().as_client_arc())
            .with_fetch_timeout(Some(Duration::from_millis(20))),
    );

    store.load_databases("pg").await;

    let snapshot = store.snapshot();
    let message = snapshot.databases("pg").and_then(CacheEntry::error).unwrap();
    assert_eq!(message, ExplorerError::Timeout(20).to_string());
    assert!(!store.is_loading(CatalogLevel::Databases, &DataKey::databases("pg")));
}

#[tokio::test]
async fn dropped_load_releases_its_slot() {
    let catalog = postgres_catalog().with_latency(Duration::from_millis(200));
    let store = store_for(&catalog);
    let key = DataKey::databases("pg");

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), store.load_databases("pg")).await;
    assert!(abandoned.is_err());
    assert!(!store.is_loading(CatalogLevel::Databases, &key));
    assert!(store.snapshot().databases("pg").is_none());

    store.load_databases("pg").await;
    assert!(store.snapshot().databases("pg").is_some());
    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("pg")), 2);
}

#[tokio::test]
async fn waiter_sees_slot_in_flight() {
    let catalog = postgres_catalog().with_latency(Duration::from_millis(30));
    let store = store_for(&catalog);
    let key = DataKey::databases("pg");

    let observer = {
        let store = store.clone();
        let key = key.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            store.snapshot().is_loading(CatalogLevel::Databases, &key)
        }
    };

    let ((), was_loading) = tokio::join!(store.load_databases("pg"), observer);

    assert!(was_loading);
    assert!(!store.is_loading(CatalogLevel::Databases, &key));
}

#[tokio::test]
async fn invalidate_source_forces_refetch() {
    let catalog = postgres_catalog().with_databases("other", &["db"]);
    let store = store_for(&catalog);

    store.load_databases("pg").await;
    store.load_schemas("pg", "prod").await;
    store.load_tables("pg", "prod", Some("public")).await;
    store.load_databases("other").await;

    assert_eq!(store.invalidate_source("pg"), 3);

    let snapshot = store.snapshot();
    assert!(snapshot.databases("pg").is_none());
    assert!(snapshot.databases("other").is_some());

    store.load_databases("pg").await;
    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("pg")), 2);
    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("other")), 1);
}

#[tokio::test]
async fn sources_failure_is_cached_at_root() {
    let catalog = FakeCatalog::new().with_error_payload(CatalogCall::Sources, "no registry");
    let store = store_for(&catalog);

    store.load_sources().await;

    assert_eq!(
        store.snapshot().sources(),
        Some(&CacheEntry::Failed("no registry".to_string()))
    );
}

#[tokio::test]
async fn passing_connection_test_reenables_source_failed_at_listing() {
    let catalog = mixed_health_catalog()
        .with_connection_check("broken", ConnectionCheck::connected())
        .with_databases("broken", &["legacy"]);
    let store = store_for(&catalog);

    store.load_sources().await;
    store
        .test_connection(&SourceInfo::new("broken", "mysql").config())
        .await;
    store.load_databases("broken").await;

    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("broken")), 1);
    assert!(store.snapshot().databases("broken").and_then(CacheEntry::loaded).is_some());
}

#[tokio::test]
async fn failed_database_fetch_stays_cached_until_invalidated() {
    let catalog = FakeCatalog::new()
        .with_sources(vec![SourceInfo::new("pg", "postgresql")])
        .with_unreachable_source("pg", "connection refused")
        .with_connection_check("pg", ConnectionCheck::connected());
    let store = store_for(&catalog);

    store.load_sources().await;
    store.load_databases("pg").await;
    store
        .test_connection(&SourceInfo::new("pg", "postgresql").config())
        .await;
    store.load_databases("pg").await;

    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("pg")), 1);
    assert_eq!(
        store.snapshot().connection("pg").map(|c| c.status),
        Some(ConnectionStatus::Connected)
    );
    assert!(store.snapshot().databases("pg").and_then(CacheEntry::error).is_some());

    store.invalidate_source("pg");
    store.load_databases("pg").await;

    assert_eq!(catalog.stats().call_count(&CatalogCall::databases("pg")), 2);
}
