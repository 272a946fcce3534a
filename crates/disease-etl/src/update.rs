//! Administrative update operations.
//!
//! Source reloads are destructive then additive: every record of the source
//! is deleted before the loader runs, so readers may briefly see the source
//! empty. Callers must not run a source reload and [`update_normalized`]
//! at the same time.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use disease_core::{DiseaseStore, RecordLoader, Result, SourceName};

use crate::merge::{Merge, MergeSummary};

/// Delete all data for one source. Returns the time spent.
pub async fn delete_source(store: &dyn DiseaseStore, src: SourceName) -> Result<Duration> {
    info!(subsystem = "etl", component = "update", source = %src, "Deleting source");
    let start = Instant::now();
    store.delete_source(src).await?;
    store.complete_write_transaction().await?;
    let elapsed = start.elapsed();
    info!(
        subsystem = "etl",
        component = "update",
        op = "delete_source",
        source = %src,
        duration_ms = elapsed.as_millis() as u64,
        "Deleted source"
    );
    Ok(elapsed)
}

/// Run a loader. Returns the time spent and the IDs it processed.
pub async fn load_source(
    store: &dyn DiseaseStore,
    loader: &dyn RecordLoader,
) -> Result<(Duration, BTreeSet<String>)> {
    let src = loader.source();
    info!(subsystem = "etl", component = "update", source = %src, "Loading source");
    let start = Instant::now();
    let processed = loader.load(store).await.map_err(|e| {
        error!(
            subsystem = "etl",
            component = "update",
            source = %src,
            error = %e,
            "Source load failed"
        );
        e
    })?;
    store.complete_write_transaction().await?;
    let elapsed = start.elapsed();
    info!(
        subsystem = "etl",
        component = "update",
        op = "load_source",
        source = %src,
        record_count = processed.len(),
        duration_ms = elapsed.as_millis() as u64,
        "Loaded source"
    );
    Ok((elapsed, processed))
}

/// Replace all data for one source.
///
/// Returns the processed IDs that may drive a merge, which is empty for
/// every source except Mondo.
pub async fn update_source(
    store: &dyn DiseaseStore,
    loader: &dyn RecordLoader,
) -> Result<BTreeSet<String>> {
    let src = loader.source();
    let delete_time = delete_source(store, src).await?;
    let (load_time, processed) = load_source(store, loader).await?;
    info!(
        subsystem = "etl",
        component = "update",
        op = "update_source",
        source = %src,
        duration_ms = (delete_time + load_time).as_millis() as u64,
        "Source update complete"
    );
    if src.is_merge_driver() {
        Ok(processed)
    } else {
        Ok(BTreeSet::new())
    }
}

/// Replace every source the loaders cover, in order.
pub async fn update_all_sources(
    store: &dyn DiseaseStore,
    loaders: &[Arc<dyn RecordLoader>],
) -> Result<BTreeSet<String>> {
    let mut processed = BTreeSet::new();
    for loader in loaders {
        processed.extend(update_source(store, loader.as_ref()).await?);
    }
    Ok(processed)
}

/// Delete every merged record and clear all `merge_ref` pointers.
pub async fn delete_normalized(store: &dyn DiseaseStore) -> Result<()> {
    info!(subsystem = "etl", component = "update", "Deleting normalized records");
    let start = Instant::now();
    store.delete_normalized_concepts().await.map_err(|e| {
        error!(
            subsystem = "etl",
            component = "update",
            error = %e,
            "Normalized record deletion failed"
        );
        e
    })?;
    store.complete_write_transaction().await?;
    info!(
        subsystem = "etl",
        component = "update",
        op = "delete_normalized",
        duration_ms = start.elapsed().as_millis() as u64,
        "Deleted normalized records"
    );
    Ok(())
}

/// Rebuild merged records from `driver_ids`, or from every stored Mondo ID
/// when none are given.
pub async fn update_normalized(
    store: &dyn DiseaseStore,
    driver_ids: Option<BTreeSet<String>>,
) -> Result<MergeSummary> {
    let start = Instant::now();
    delete_normalized(store).await?;
    let driver_ids = match driver_ids {
        Some(ids) if !ids.is_empty() => ids,
        _ => store.get_all_concept_ids(Some(SourceName::Mondo)).await?,
    };
    let summary = Merge::new(store).create_merged_concepts(&driver_ids).await?;
    info!(
        subsystem = "etl",
        component = "update",
        op = "update_normalized",
        result_count = summary.merged_written,
        duration_ms = start.elapsed().as_millis() as u64,
        "Merged concept generation completed"
    );
    Ok(summary)
}

/// Reload every source, then rebuild merged records from the Mondo IDs the
/// reload produced.
pub async fn update_all_and_normalize(
    store: &dyn DiseaseStore,
    loaders: &[Arc<dyn RecordLoader>],
) -> Result<MergeSummary> {
    let processed = update_all_sources(store, loaders).await?;
    update_normalized(store, Some(processed)).await
}
