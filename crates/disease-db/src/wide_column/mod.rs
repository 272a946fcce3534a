//! Wide-column storage backend.
//!
//! Keeps every record, reference entry, and source-metadata item in one table
//! (see [`table`]). Record writes are buffered and applied in batches; the
//! buffer is flushed automatically when full and on
//! [`complete_write_transaction`](DiseaseStore::complete_write_transaction).
//! When opened with a snapshot path, the table is persisted to that file on
//! every flush.

pub mod table;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use disease_core::defaults::{SCAN_PAGE_SIZE, WRITE_BATCH_SIZE};
use disease_core::{
    Disease, DiseaseStore, Error, IdentityRecord, MergedRecord, RecordType, RefType, Result,
    SourceMeta, SourceName, StoredRecord,
};

use crate::guard::DropGuard;
use table::{partition_key, Item, ItemBody, ItemKey, ItemType, Table};

/// Name of the single table.
pub const TABLE_NAME: &str = "disease_normalizer";

/// A buffered record write.
#[derive(Debug)]
enum PendingWrite {
    Identity(IdentityRecord),
    Merged(MergedRecord),
}

/// On-disk snapshot layout.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    table_name: String,
    items: Vec<Item>,
}

/// Single-table store held in memory, optionally persisted to a snapshot file.
pub struct WideColumnStore {
    /// `None` until the table is created and after it is dropped.
    table: RwLock<Option<Table>>,
    pending: Mutex<Vec<PendingWrite>>,
    snapshot_path: Option<PathBuf>,
    guard: DropGuard,
}

impl WideColumnStore {
    /// An ephemeral store. The table does not exist until
    /// [`initialize_db`](DiseaseStore::initialize_db) runs.
    pub fn in_memory(guard: DropGuard) -> Self {
        Self {
            table: RwLock::new(None),
            pending: Mutex::new(Vec::new()),
            snapshot_path: None,
            guard,
        }
    }

    /// A store persisted at `path`, loading the existing snapshot if present.
    pub async fn open(path: impl AsRef<Path>, guard: DropGuard) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::DatabaseInitialization(format!(
                        "corrupt snapshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(
                    subsystem = "db",
                    component = "wide_column",
                    op = "open",
                    path = %path.display(),
                    record_count = snapshot.items.len(),
                    "Loaded table snapshot"
                );
                Some(Table::from_items(snapshot.items))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(Error::DatabaseInitialization(format!(
                    "cannot read snapshot {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Self {
            table: RwLock::new(table),
            pending: Mutex::new(Vec::new()),
            snapshot_path: Some(path),
            guard,
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    fn missing_table() -> Error {
        Error::DatabaseRead(format!("table {} does not exist", TABLE_NAME))
    }

    async fn enqueue(&self, write: PendingWrite) -> Result<()> {
        let mut pending = self.pending.lock().await;
        pending.push(write);
        if pending.len() >= WRITE_BATCH_SIZE {
            let batch = std::mem::take(&mut *pending);
            drop(pending);
            self.apply(batch).await?;
        }
        Ok(())
    }

    async fn apply(&self, batch: Vec<PendingWrite>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut guard = self.table.write().await;
        let table = guard.as_mut().ok_or_else(|| {
            Error::DatabaseWrite(format!("table {} does not exist", TABLE_NAME))
        })?;
        debug!(
            subsystem = "db",
            component = "wide_column",
            op = "flush",
            record_count = batch.len(),
            "Applying buffered writes"
        );
        for write in batch {
            match write {
                PendingWrite::Identity(record) => table.put_identity(record),
                PendingWrite::Merged(record) => table.put_merged(record),
            }
        }
        Ok(())
    }

    async fn flush_pending(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        self.apply(batch).await
    }

    /// Atomically replace the snapshot file with the current table.
    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let bytes = {
            let guard = self.table.read().await;
            let Some(table) = guard.as_ref() else {
                return Ok(());
            };
            let snapshot = Snapshot {
                table_name: TABLE_NAME.to_string(),
                items: table.items().cloned().collect(),
            };
            serde_json::to_vec(&snapshot)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await.map_err(|e| {
            error!(subsystem = "db", component = "wide_column", temp_path = %temp_path.display(), error = %e, "Snapshot write failed");
            Error::DatabaseWrite(format!("snapshot write failed: {}", e))
        })?;
        fs::rename(&temp_path, path).await.map_err(|e| {
            error!(subsystem = "db", component = "wide_column", from = %temp_path.display(), to = %path.display(), error = %e, "Snapshot rename failed");
            Error::DatabaseWrite(format!("snapshot rename failed: {}", e))
        })?;
        Ok(())
    }

    async fn scan_page(
        &self,
        record_type: RecordType,
        cursor: Option<ItemKey>,
    ) -> Result<(Vec<StoredRecord>, Option<ItemKey>)> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or_else(Self::missing_table)?;
        let page = table.scan(cursor.as_ref(), SCAN_PAGE_SIZE);
        let records = page
            .items
            .into_iter()
            .filter_map(|item| match (record_type, item.body) {
                (RecordType::Identity, ItemBody::Identity(record)) => {
                    Some(StoredRecord::Identity(record))
                }
                (RecordType::Merger, ItemBody::Identity(record)) if record.merge_ref.is_none() => {
                    Some(StoredRecord::Identity(record))
                }
                (RecordType::Merger, ItemBody::Merger(record)) => Some(StoredRecord::Merger(record)),
                _ => None,
            })
            .collect();
        Ok((records, page.last_evaluated_key))
    }
}

#[async_trait]
impl DiseaseStore for WideColumnStore {
    fn backend_name(&self) -> &'static str {
        "wide_column"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(match self.table.read().await.as_ref() {
            Some(_) => vec![TABLE_NAME.to_string()],
            None => Vec::new(),
        })
    }

    async fn initialize_db(&self) -> Result<()> {
        let mut guard = self.table.write().await;
        if guard.is_none() {
            info!(
                subsystem = "db",
                component = "wide_column",
                op = "initialize_db",
                db_table = TABLE_NAME,
                "Creating table"
            );
            *guard = Some(Table::new());
        }
        Ok(())
    }

    async fn check_schema_initialized(&self) -> Result<bool> {
        let exists = self.table.read().await.is_some();
        if !exists {
            info!(subsystem = "db", component = "wide_column", "{} is missing or unavailable", TABLE_NAME);
        }
        Ok(exists)
    }

    async fn check_tables_populated(&self) -> Result<bool> {
        let guard = self.table.read().await;
        let Some(table) = guard.as_ref() else {
            return Ok(false);
        };
        if table.count_item_type(ItemType::Source) < SourceName::ALL.len() {
            info!(subsystem = "db", component = "wide_column", "Table is missing expected sources");
            return Ok(false);
        }
        if table.count_item_type(ItemType::Identity) < 1 {
            info!(subsystem = "db", component = "wide_column", "Identity records are empty");
            return Ok(false);
        }
        if table.count_item_type(ItemType::Merger) < 1 {
            info!(subsystem = "db", component = "wide_column", "Normalized records are empty");
            return Ok(false);
        }
        Ok(true)
    }

    async fn drop_db(&self) -> Result<()> {
        if !self.guard.check()? {
            info!(subsystem = "db", component = "wide_column", op = "drop_db", "Drop not confirmed");
            return Ok(());
        }
        self.pending.lock().await.clear();
        *self.table.write().await = None;
        if let Some(path) = &self.snapshot_path {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::DatabaseWrite(format!("cannot remove snapshot: {}", e))),
            }
        }
        info!(subsystem = "db", component = "wide_column", op = "drop_db", "Dropped table {}", TABLE_NAME);
        Ok(())
    }

    async fn get_source_metadata(&self, src: SourceName) -> Result<Option<SourceMeta>> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or_else(Self::missing_table)?;
        Ok(match table.get(&ItemKey::source(src)) {
            Some(Item {
                body: ItemBody::Source(meta),
                ..
            }) => Some(meta.clone()),
            _ => None,
        })
    }

    async fn add_source_metadata(&self, src: SourceName, meta: &SourceMeta) -> Result<()> {
        let mut guard = self.table.write().await;
        let table = guard
            .as_mut()
            .ok_or_else(|| Error::DatabaseWrite(format!("table {} does not exist", TABLE_NAME)))?;
        table.put_source(src, meta.clone());
        Ok(())
    }

    async fn add_record(&self, record: &Disease, src: SourceName) -> Result<()> {
        self.enqueue(PendingWrite::Identity(IdentityRecord::new(record.clone(), src)))
            .await
    }

    async fn add_merged_record(&self, record: &MergedRecord) -> Result<()> {
        self.enqueue(PendingWrite::Merged(record.clone())).await
    }

    async fn get_record_by_id(
        &self,
        concept_id: &str,
        case_sensitive: bool,
    ) -> Result<Option<IdentityRecord>> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or_else(Self::missing_table)?;
        let found = if case_sensitive {
            table.get(&ItemKey::identity(concept_id))
        } else {
            table
                .query_partition(&partition_key(concept_id, ItemType::Identity))
                .next()
        };
        Ok(match found {
            Some(Item {
                body: ItemBody::Identity(record),
                ..
            }) => Some(record.clone()),
            _ => None,
        })
    }

    async fn get_merged_record_by_id(
        &self,
        concept_id: &str,
        case_sensitive: bool,
    ) -> Result<Option<MergedRecord>> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or_else(Self::missing_table)?;
        let found = if case_sensitive {
            table.get(&ItemKey::merger(concept_id))
        } else {
            table
                .query_partition(&partition_key(concept_id, ItemType::Merger))
                .next()
        };
        Ok(match found {
            Some(Item {
                body: ItemBody::Merger(record),
                ..
            }) => Some(record.clone()),
            _ => None,
        })
    }

    async fn get_refs_by_type(&self, term: &str, ref_type: RefType) -> Result<Vec<String>> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or_else(Self::missing_table)?;
        Ok(table
            .query_partition(&partition_key(term, ItemType::from(ref_type)))
            .map(|item| item.key.concept_id.clone())
            .collect())
    }

    async fn get_all_concept_ids(&self, source: Option<SourceName>) -> Result<BTreeSet<String>> {
        let guard = self.table.read().await;
        let table = guard.as_ref().ok_or_else(Self::missing_table)?;
        let keys = match source {
            Some(src) => table
                .query_src_index(src)
                .into_iter()
                .filter(|k| k.label_and_type.ends_with("##identity"))
                .collect::<Vec<_>>(),
            None => table.query_item_type_index(ItemType::Identity),
        };
        Ok(keys.into_iter().map(|k| k.concept_id).collect())
    }

    fn all_records(&self, record_type: RecordType) -> BoxStream<'_, Result<StoredRecord>> {
        // state: Some(cursor) while pages remain, None once exhausted
        stream::try_unfold(Some(None::<ItemKey>), move |state| async move {
            let Some(cursor) = state else {
                return Ok::<_, Error>(None);
            };
            let (records, next) = self.scan_page(record_type, cursor).await?;
            let next_state = next.map(Some);
            Ok(Some((records, next_state)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<StoredRecord, Error>)))
        .try_flatten()
        .boxed()
    }

    async fn update_merge_ref(&self, concept_id: &str, merge_ref: &str) -> Result<()> {
        self.flush_pending().await?;
        let mut guard = self.table.write().await;
        let table = guard
            .as_mut()
            .ok_or_else(|| Error::DatabaseWrite(format!("table {} does not exist", TABLE_NAME)))?;
        let key = ItemKey::identity(concept_id);
        match table.get_mut(&key) {
            Some(Item {
                body: ItemBody::Identity(record),
                ..
            }) => {
                record.merge_ref = Some(merge_ref.to_string());
                Ok(())
            }
            _ => Err(Error::NotFound(format!(
                "No such record exists for keys {}, {}",
                key.label_and_type, key.concept_id
            ))),
        }
    }

    async fn delete_source(&self, src: SourceName) -> Result<()> {
        let start = Instant::now();
        self.flush_pending().await?;
        let mut guard = self.table.write().await;
        let table = guard
            .as_mut()
            .ok_or_else(|| Error::DatabaseWrite(format!("table {} does not exist", TABLE_NAME)))?;
        let keys = table.query_src_index(src);
        for key in &keys {
            table.delete(key);
        }
        info!(
            subsystem = "db",
            component = "wide_column",
            op = "delete_source",
            source = %src,
            record_count = keys.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Deleted source items"
        );
        Ok(())
    }

    async fn delete_normalized_concepts(&self) -> Result<()> {
        self.flush_pending().await?;
        let mut guard = self.table.write().await;
        let table = guard
            .as_mut()
            .ok_or_else(|| Error::DatabaseWrite(format!("table {} does not exist", TABLE_NAME)))?;
        let merged = table.query_item_type_index(ItemType::Merger);
        for key in &merged {
            table.delete(key);
        }
        for key in table.query_item_type_index(ItemType::Identity) {
            if let Some(Item {
                body: ItemBody::Identity(record),
                ..
            }) = table.get_mut(&key)
            {
                record.merge_ref = None;
            }
        }
        info!(
            subsystem = "db",
            component = "wide_column",
            op = "delete_normalized_concepts",
            record_count = merged.len(),
            "Deleted normalized records"
        );
        Ok(())
    }

    async fn complete_write_transaction(&self) -> Result<()> {
        self.flush_pending().await?;
        self.persist().await
    }

    async fn close(&self) -> Result<()> {
        self.complete_write_transaction().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_fail_before_initialize() {
        let store = WideColumnStore::in_memory(DropGuard::default());
        assert!(!store.check_schema_initialized().await.unwrap());
        let err = store.get_record_by_id("ncit:C3270", true).await.unwrap_err();
        assert!(err.is_read_failure());
    }

    #[tokio::test]
    async fn test_writes_invisible_until_flushed() {
        let store = WideColumnStore::in_memory(DropGuard::default());
        store.initialize_db().await.unwrap();
        store
            .add_record(&Disease::new("ncit:C3270", "Neuroblastoma"), SourceName::Ncit)
            .await
            .unwrap();
        assert!(store.get_record_by_id("ncit:C3270", true).await.unwrap().is_none());

        store.complete_write_transaction().await.unwrap();
        assert!(store.get_record_by_id("ncit:C3270", true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_flushes_automatically_when_full() {
        let store = WideColumnStore::in_memory(DropGuard::default());
        store.initialize_db().await.unwrap();
        for i in 0..WRITE_BATCH_SIZE {
            store
                .add_record(&Disease::new(format!("DOID:{}", i), format!("term {}", i)), SourceName::Do)
                .await
                .unwrap();
        }
        assert!(store.pending.lock().await.is_empty());
        assert_eq!(
            store.get_all_concept_ids(Some(SourceName::Do)).await.unwrap().len(),
            WRITE_BATCH_SIZE
        );
    }
}
