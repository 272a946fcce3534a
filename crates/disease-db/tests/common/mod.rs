//! Storage contract checks shared by the wide-column and PostgreSQL suites.
//!
//! Each check takes a freshly initialized, empty store.

#![allow(dead_code)]

use std::collections::BTreeSet;

use futures::TryStreamExt;

use disease_db::test_fixtures::{
    load_neuroblastoma, mondo_neuroblastoma, ncit_neuroblastoma, source_meta,
};
use disease_db::{
    Disease, DiseaseStore, Error, IdentityRecord, MergedRecord, RecordType, RefType, SourceName,
    StoredRecord,
};

fn merged_neuroblastoma() -> MergedRecord {
    MergedRecord {
        concept_id: "ncit:C3270".into(),
        label: "Neuroblastoma".into(),
        member_ids: ["mondo:0005072".to_string(), "DOID:769".to_string()]
            .into_iter()
            .collect(),
        aliases: BTreeSet::new(),
        associated_with: ["umls:C0027819".to_string()].into_iter().collect(),
        pediatric_disease: Some(true),
        oncologic_disease: Some(true),
    }
}

async fn write_merged(store: &dyn DiseaseStore) {
    store.add_merged_record(&merged_neuroblastoma()).await.unwrap();
    store.complete_write_transaction().await.unwrap();
    for id in ["ncit:C3270", "mondo:0005072", "DOID:769"] {
        store.update_merge_ref(id, "ncit:C3270").await.unwrap();
    }
    store.complete_write_transaction().await.unwrap();
}

pub async fn check_round_trip(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;

    let fetched = store.get_record_by_id("ncit:C3270", true).await.unwrap().unwrap();
    assert_eq!(fetched, IdentityRecord::new(ncit_neuroblastoma(), SourceName::Ncit));

    let mondo = store.get_record_by_id("mondo:0005072", true).await.unwrap().unwrap();
    assert_eq!(mondo.disease, mondo_neuroblastoma());
    assert_eq!(mondo.src_name, SourceName::Mondo);
    assert!(mondo.merge_ref.is_none());
}

pub async fn check_case_insensitive_lookup(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;

    let exact = store.get_record_by_id("ncit:C3270", true).await.unwrap();
    let folded = store.get_record_by_id("ncit:c3270", false).await.unwrap();
    assert!(exact.is_some());
    assert_eq!(exact, folded);

    // exact lookups require the stored case
    assert!(store.get_record_by_id("NCIT:C3270", true).await.unwrap().is_none());
    assert!(store.get_record_by_id("doid:769", false).await.unwrap().is_some());
}

pub async fn check_refs_by_type(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;

    let labels = store.get_refs_by_type("neuroblastoma", RefType::Label).await.unwrap();
    assert_eq!(
        labels,
        vec!["DOID:769", "MIM:256700", "mondo:0005072", "ncit:C3270", "oncotree:NBL"]
    );

    let xrefs = store.get_refs_by_type("ncit:c3270", RefType::Xref).await.unwrap();
    assert_eq!(xrefs, vec!["DOID:769", "mondo:0005072", "oncotree:NBL"]);

    let aliases = store.get_refs_by_type("nb", RefType::Alias).await.unwrap();
    assert_eq!(aliases, vec!["mondo:0005072"]);

    let associated = store
        .get_refs_by_type("umls:c0027819", RefType::AssociatedWith)
        .await
        .unwrap();
    assert_eq!(associated, vec!["DOID:769", "mondo:0005072", "ncit:C3270"]);

    let miss = store.get_refs_by_type("nonexistent-xyz", RefType::Label).await.unwrap();
    assert!(miss.is_empty());
}

pub async fn check_replay_is_idempotent(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    load_neuroblastoma(store).await;

    let labels = store.get_refs_by_type("neuroblastoma", RefType::Label).await.unwrap();
    assert_eq!(labels.len(), 5);
    assert_eq!(store.get_all_concept_ids(None).await.unwrap().len(), 5);
}

pub async fn check_replacement_retires_references(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    store
        .add_record(&Disease::new("MIM:256700", "Neuroblastoma, susceptibility to, 1"), SourceName::Omim)
        .await
        .unwrap();
    store.complete_write_transaction().await.unwrap();

    assert!(store.get_refs_by_type("nblst1", RefType::Alias).await.unwrap().is_empty());
    let labels = store.get_refs_by_type("neuroblastoma", RefType::Label).await.unwrap();
    assert!(!labels.contains(&"MIM:256700".to_string()));
}

pub async fn check_concept_ids(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;

    let mondo = store.get_all_concept_ids(Some(SourceName::Mondo)).await.unwrap();
    assert_eq!(mondo, ["mondo:0005072".to_string()].into_iter().collect());

    let all = store.get_all_concept_ids(None).await.unwrap();
    assert_eq!(all.len(), 5);
    assert!(all.contains("oncotree:NBL"));
}

pub async fn check_source_metadata(store: &dyn DiseaseStore) {
    assert!(store.get_source_metadata(SourceName::Do).await.unwrap().is_none());
    load_neuroblastoma(store).await;

    let meta = store.get_source_metadata(SourceName::Omim).await.unwrap().unwrap();
    assert_eq!(meta, source_meta(SourceName::Omim));

    let mut updated = source_meta(SourceName::Omim);
    updated.version = "2024-09-01".into();
    store.add_source_metadata(SourceName::Omim, &updated).await.unwrap();
    let meta = store.get_source_metadata(SourceName::Omim).await.unwrap().unwrap();
    assert_eq!(meta.version, "2024-09-01");
}

pub async fn check_merge_refs_and_record_streams(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    assert!(!store.check_tables_populated().await.unwrap());
    write_merged(store).await;
    assert!(store.check_tables_populated().await.unwrap());

    let merged = store.get_merged_record_by_id("NCIT:C3270", false).await.unwrap().unwrap();
    assert_eq!(merged, merged_neuroblastoma());
    assert_eq!(merged.src_name(), Some(SourceName::Ncit));
    assert!(store.get_merged_record_by_id("mondo:0005072", false).await.unwrap().is_none());

    let mondo = store.get_record_by_id("mondo:0005072", true).await.unwrap().unwrap();
    assert_eq!(mondo.merge_ref.as_deref(), Some("ncit:C3270"));

    let identity: Vec<StoredRecord> = store
        .all_records(RecordType::Identity)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(identity.len(), 5);
    assert!(identity.iter().all(|r| matches!(r, StoredRecord::Identity(_))));

    let normalized: Vec<StoredRecord> = store
        .all_records(RecordType::Merger)
        .try_collect()
        .await
        .unwrap();
    let ids: BTreeSet<&str> = normalized.iter().map(|r| r.concept_id()).collect();
    assert_eq!(ids, ["ncit:C3270", "oncotree:NBL", "MIM:256700"].into_iter().collect());
    let merger_count = normalized
        .iter()
        .filter(|r| matches!(r, StoredRecord::Merger(_)))
        .count();
    assert_eq!(merger_count, 1);
}

pub async fn check_update_merge_ref_missing_record(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    store.add_merged_record(&merged_neuroblastoma()).await.unwrap();
    store.complete_write_transaction().await.unwrap();

    let err = store.update_merge_ref("ncit:C9999", "ncit:C3270").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "unexpected error: {:?}", err);
}

/// A record added in the current write transaction can be pointed at its
/// merged record before the transaction completes.
pub async fn check_update_merge_ref_before_flush(store: &dyn DiseaseStore) {
    store
        .add_record(&ncit_neuroblastoma(), SourceName::Ncit)
        .await
        .unwrap();
    store.update_merge_ref("ncit:C3270", "ncit:C3270").await.unwrap();
    store.complete_write_transaction().await.unwrap();

    let record = store.get_record_by_id("ncit:C3270", true).await.unwrap().unwrap();
    assert_eq!(record.merge_ref.as_deref(), Some("ncit:C3270"));
}

pub async fn check_delete_source(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    write_merged(store).await;

    store.delete_source(SourceName::Ncit).await.unwrap();
    store.complete_write_transaction().await.unwrap();

    assert!(store.get_record_by_id("ncit:C3270", true).await.unwrap().is_none());
    assert!(store.get_source_metadata(SourceName::Ncit).await.unwrap().is_none());
    let labels = store.get_refs_by_type("neuroblastoma", RefType::Label).await.unwrap();
    assert!(!labels.contains(&"ncit:C3270".to_string()));
    assert_eq!(labels.len(), 4);
    let associated = store
        .get_refs_by_type("umls:c0027819", RefType::AssociatedWith)
        .await
        .unwrap();
    assert_eq!(associated, vec!["DOID:769", "mondo:0005072"]);

    // other sources and merged records survive
    assert!(store.get_record_by_id("mondo:0005072", true).await.unwrap().is_some());
    assert!(store.get_merged_record_by_id("ncit:C3270", true).await.unwrap().is_some());
}

pub async fn check_delete_normalized(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    write_merged(store).await;

    store.delete_normalized_concepts().await.unwrap();
    store.complete_write_transaction().await.unwrap();

    assert!(store.get_merged_record_by_id("ncit:C3270", true).await.unwrap().is_none());
    let mondo = store.get_record_by_id("mondo:0005072", true).await.unwrap().unwrap();
    assert!(mondo.merge_ref.is_none());
    assert_eq!(store.get_all_concept_ids(None).await.unwrap().len(), 5);
}

pub async fn check_drop_db(store: &dyn DiseaseStore) {
    load_neuroblastoma(store).await;
    assert!(store.check_schema_initialized().await.unwrap());

    store.drop_db().await.unwrap();
    assert!(!store.check_schema_initialized().await.unwrap());

    store.initialize_db().await.unwrap();
    assert!(store.check_schema_initialized().await.unwrap());
    assert!(store.get_all_concept_ids(None).await.unwrap().is_empty());
}
