//! Storage contract tests against the wide-column backend, plus behavior
//! specific to its buffering and snapshot persistence.

mod common;

use std::sync::Arc;

use futures::TryStreamExt;

use disease_db::test_fixtures::{load_neuroblastoma, memory_store};
use disease_db::{
    Confirmer, DeployEnv, Disease, DiseaseStore, DropGuard, Error, RecordType, SourceName,
    StoredRecord, WideColumnStore,
};

#[tokio::test]
async fn test_round_trip() {
    common::check_round_trip(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_case_insensitive_lookup() {
    common::check_case_insensitive_lookup(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_refs_by_type() {
    common::check_refs_by_type(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    common::check_replay_is_idempotent(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_replacement_retires_references() {
    common::check_replacement_retires_references(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_concept_ids() {
    common::check_concept_ids(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_source_metadata() {
    common::check_source_metadata(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_merge_refs_and_record_streams() {
    common::check_merge_refs_and_record_streams(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_update_merge_ref_missing_record() {
    common::check_update_merge_ref_missing_record(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_update_merge_ref_before_flush() {
    common::check_update_merge_ref_before_flush(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_delete_source() {
    common::check_delete_source(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_delete_normalized() {
    common::check_delete_normalized(memory_store().await.as_ref()).await;
}

#[tokio::test]
async fn test_drop_db() {
    common::check_drop_db(memory_store().await.as_ref()).await;
}

// ============================================================================
// Wide-column specifics
// ============================================================================

#[tokio::test]
async fn test_all_records_spans_many_pages() {
    let store = memory_store().await;
    for i in 0..1_234 {
        store
            .add_record(&Disease::new(format!("DOID:{}", i), format!("disease {}", i)), SourceName::Do)
            .await
            .unwrap();
    }
    store.complete_write_transaction().await.unwrap();

    // each record also writes a label item, so the scan crosses several pages
    let records: Vec<StoredRecord> = store
        .all_records(RecordType::Identity)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(records.len(), 1_234);

    // streams restart on every call
    let again: Vec<StoredRecord> = store
        .all_records(RecordType::Merger)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(again.len(), 1_234);
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("disease_normalizer.json");

    {
        let store = WideColumnStore::open(&path, DropGuard::default()).await.unwrap();
        assert!(!store.check_schema_initialized().await.unwrap());
        store.initialize_db().await.unwrap();
        load_neuroblastoma(&store).await;
        store.close().await.unwrap();
    }
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let reopened = WideColumnStore::open(&path, DropGuard::default()).await.unwrap();
    assert!(reopened.check_schema_initialized().await.unwrap());
    let record = reopened.get_record_by_id("mondo:0005072", true).await.unwrap().unwrap();
    assert_eq!(record.disease.label, "neuroblastoma");
    assert_eq!(
        reopened.get_refs_by_type("nb", disease_db::RefType::Alias).await.unwrap(),
        vec!["mondo:0005072"]
    );
    assert_eq!(reopened.get_all_concept_ids(Some(SourceName::Omim)).await.unwrap().len(), 1);

    reopened.drop_db().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_corrupt_snapshot_fails_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, b"{not json").unwrap();

    let err = WideColumnStore::open(&path, DropGuard::default()).await.err().unwrap();
    assert!(matches!(err, Error::DatabaseInitialization(_)));
}

struct Refuse;

impl Confirmer for Refuse {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

#[tokio::test]
async fn test_protected_drop_requires_confirmation() {
    let guard = DropGuard::new(Some(DeployEnv::Prod), false).with_confirmer(Arc::new(Refuse));
    let store = WideColumnStore::in_memory(guard);
    store.initialize_db().await.unwrap();
    load_neuroblastoma(&store).await;

    store.drop_db().await.unwrap();
    assert!(store.check_schema_initialized().await.unwrap());
    assert_eq!(store.get_all_concept_ids(None).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_silent_production_drop_is_refused() {
    let store = WideColumnStore::in_memory(DropGuard::new(Some(DeployEnv::Prod), true));
    store.initialize_db().await.unwrap();

    let err = store.drop_db().await.unwrap_err();
    assert!(matches!(err, Error::DatabaseWrite(_)));
    assert!(store.check_schema_initialized().await.unwrap());
}
