//! Source reloads and normalized rebuilds through the JSON-lines loader.

use std::path::Path;
use std::sync::Arc;

use disease_db::test_fixtures::{memory_store, neuroblastoma_records, source_meta};
use disease_db::{Disease, DiseaseStore, Error, RecordLoader, RefType, SourceName};
use disease_etl::{
    update_all_and_normalize, update_normalized, update_source, JsonLinesLoader,
};

fn write_source(dir: &Path, src: SourceName, records: &[Disease]) {
    let stem = src.as_str().to_lowercase();
    std::fs::write(
        dir.join(format!("{}_meta.json", stem)),
        serde_json::to_string(&source_meta(src)).unwrap(),
    )
    .unwrap();
    let lines: Vec<String> = records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect();
    std::fs::write(dir.join(format!("{}.jsonl", stem)), lines.join("\n") + "\n").unwrap();
}

fn write_neuroblastoma(dir: &Path) {
    for src in SourceName::ALL {
        let records: Vec<Disease> = neuroblastoma_records()
            .into_iter()
            .filter(|(s, _)| *s == src)
            .map(|(_, d)| d)
            .collect();
        write_source(dir, src, &records);
    }
}

#[tokio::test]
async fn test_update_all_and_normalize() {
    let dir = tempfile::tempdir().unwrap();
    write_neuroblastoma(dir.path());
    let store = memory_store().await;

    let loaders = JsonLinesLoader::for_all_sources(dir.path());
    let summary = update_all_and_normalize(store.as_ref(), &loaders).await.unwrap();

    assert_eq!(summary.merged_written, 1);
    assert!(store.check_tables_populated().await.unwrap());
    assert_eq!(
        store.get_source_metadata(SourceName::Do).await.unwrap(),
        Some(source_meta(SourceName::Do))
    );
    let merged = store.get_merged_record_by_id("ncit:C3270", true).await.unwrap().unwrap();
    assert_eq!(merged.member_ids.len(), 2);
}

#[tokio::test]
async fn test_update_source_returns_only_driver_ids() {
    let dir = tempfile::tempdir().unwrap();
    write_neuroblastoma(dir.path());
    let store = memory_store().await;

    let ncit = JsonLinesLoader::new(SourceName::Ncit, dir.path());
    assert!(update_source(store.as_ref(), &ncit).await.unwrap().is_empty());
    assert!(store.get_record_by_id("ncit:C3270", true).await.unwrap().is_some());

    let mondo = JsonLinesLoader::new(SourceName::Mondo, dir.path());
    let ids = update_source(store.as_ref(), &mondo).await.unwrap();
    assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["mondo:0005072"]);
}

#[tokio::test]
async fn test_update_source_replaces_previous_records() {
    let dir = tempfile::tempdir().unwrap();
    write_neuroblastoma(dir.path());
    let store = memory_store().await;
    let omim = JsonLinesLoader::new(SourceName::Omim, dir.path());
    update_source(store.as_ref(), &omim).await.unwrap();

    write_source(
        dir.path(),
        SourceName::Omim,
        &[Disease::new("MIM:162200", "Neurofibromatosis, type I")],
    );
    update_source(store.as_ref(), &omim).await.unwrap();

    assert!(store.get_record_by_id("MIM:256700", true).await.unwrap().is_none());
    assert!(store.get_refs_by_type("nblst1", RefType::Alias).await.unwrap().is_empty());
    assert_eq!(
        store.get_all_concept_ids(Some(SourceName::Omim)).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_loader_applies_input_rules() {
    let dir = tempfile::tempdir().unwrap();
    let aliases: Vec<String> = (0..25).map(|i| format!("alias {}", i)).collect();
    write_source(
        dir.path(),
        SourceName::Do,
        &[Disease::new("DOID:1", "many aliases").with_aliases(aliases)],
    );
    // duplicate list entries collapse on load
    let path = dir.path().join("do.jsonl");
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str(
        r#"{"concept_id": "DOID:2", "label": "dupes", "xrefs": ["ncit:C1", "ncit:C1"]}"#,
    );
    contents.push_str("\n\n");
    std::fs::write(&path, contents).unwrap();

    let store = memory_store().await;
    let loader = JsonLinesLoader::new(SourceName::Do, dir.path());
    update_source(store.as_ref(), &loader).await.unwrap();

    let record = store.get_record_by_id("DOID:1", true).await.unwrap().unwrap();
    assert!(record.disease.aliases.is_empty());
    let record = store.get_record_by_id("DOID:2", true).await.unwrap().unwrap();
    assert_eq!(record.disease.xrefs.len(), 1);
}

#[tokio::test]
async fn test_loader_rejects_malformed_input() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), SourceName::Do, &[]);
    std::fs::write(dir.path().join("do.jsonl"), "{\"concept_id\": \"DOID:1\"\n").unwrap();

    let store = memory_store().await;
    let loader = JsonLinesLoader::new(SourceName::Do, dir.path());
    let err = update_source(store.as_ref(), &loader).await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)), "unexpected error: {:?}", err);

    std::fs::write(
        dir.path().join("do.jsonl"),
        r#"{"concept_id": "DOID:1", "label": ""}"#,
    )
    .unwrap();
    let err = update_source(store.as_ref(), &loader).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
}

#[tokio::test]
async fn test_loader_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = memory_store().await;
    let loader: Arc<dyn RecordLoader> = Arc::new(JsonLinesLoader::new(SourceName::Ncit, dir.path()));
    let err = update_source(store.as_ref(), loader.as_ref()).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn test_update_normalized_falls_back_to_stored_mondo_ids() {
    let dir = tempfile::tempdir().unwrap();
    write_neuroblastoma(dir.path());
    let store = memory_store().await;
    for loader in JsonLinesLoader::for_all_sources(dir.path()) {
        update_source(store.as_ref(), loader.as_ref()).await.unwrap();
    }

    let summary = update_normalized(store.as_ref(), None).await.unwrap();
    assert_eq!(summary.drivers_processed, 1);
    assert_eq!(summary.merged_written, 1);

    // an empty id set also falls back
    let summary = update_normalized(store.as_ref(), Some(Default::default())).await.unwrap();
    assert_eq!(summary.merged_written, 1);
}
