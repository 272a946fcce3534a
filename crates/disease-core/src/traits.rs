//! Core traits for the disease normalizer.
//!
//! [`DiseaseStore`] is the storage contract both backends satisfy. Lookups
//! must return the same logical results regardless of physical layout.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Persistent storage for identity records, merged records, reference index
/// entries, and source metadata.
///
/// Writes are not guaranteed visible to reads until
/// [`complete_write_transaction`](DiseaseStore::complete_write_transaction)
/// returns.
#[async_trait]
pub trait DiseaseStore: Send + Sync {
    /// Short backend identifier for logs ("postgres", "wide_column").
    fn backend_name(&self) -> &'static str;

    /// Names of the physical tables backing this store.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Create any missing tables, indexes, and views. Idempotent.
    async fn initialize_db(&self) -> Result<()>;

    /// Whether every required table exists.
    async fn check_schema_initialized(&self) -> Result<bool>;

    /// Whether every source has metadata and at least one identity and one
    /// merged record exist.
    async fn check_tables_populated(&self) -> Result<bool>;

    /// Destroy all stored data. Subject to the store's drop guard.
    async fn drop_db(&self) -> Result<()>;

    /// Stored metadata for a source, if loaded.
    async fn get_source_metadata(&self, src: SourceName) -> Result<Option<SourceMeta>>;

    /// Upsert a source's metadata.
    async fn add_source_metadata(&self, src: SourceName, meta: &SourceMeta) -> Result<()>;

    /// Write an identity record and its reference index entries, replacing
    /// any record with the same concept ID.
    async fn add_record(&self, record: &Disease, src: SourceName) -> Result<()>;

    /// Write a merged record keyed by its concept ID.
    async fn add_merged_record(&self, record: &MergedRecord) -> Result<()>;

    /// Fetch an identity record by concept ID.
    ///
    /// With `case_sensitive` the ID must match exactly; otherwise it is
    /// compared lower-cased.
    async fn get_record_by_id(
        &self,
        concept_id: &str,
        case_sensitive: bool,
    ) -> Result<Option<IdentityRecord>>;

    /// Fetch a merged record by concept ID.
    async fn get_merged_record_by_id(
        &self,
        concept_id: &str,
        case_sensitive: bool,
    ) -> Result<Option<MergedRecord>>;

    /// Concept IDs whose `ref_type` entries match the lower-cased `term`.
    ///
    /// Sorted, and empty on a miss.
    async fn get_refs_by_type(&self, term: &str, ref_type: RefType) -> Result<Vec<String>>;

    /// Concept IDs of all identity records, optionally limited to one source.
    async fn get_all_concept_ids(&self, source: Option<SourceName>) -> Result<BTreeSet<String>>;

    /// Lazily stream stored records in bounded pages.
    ///
    /// `Identity` yields identity records only. `Merger` yields every merged
    /// record plus each identity record without a `merge_ref`. Each call
    /// starts a fresh scan.
    fn all_records(&self, record_type: RecordType) -> BoxStream<'_, Result<StoredRecord>>;

    /// Point an identity record at its merged record.
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) when no identity
    /// record has this concept ID. Records added earlier in the same write
    /// transaction count, flushed or not.
    async fn update_merge_ref(&self, concept_id: &str, merge_ref: &str) -> Result<()>;

    /// Remove every identity record of a source with its index entries and
    /// metadata. Merged records are untouched.
    async fn delete_source(&self, src: SourceName) -> Result<()>;

    /// Remove every merged record and clear all `merge_ref` pointers.
    async fn delete_normalized_concepts(&self) -> Result<()>;

    /// Flush buffered writes and refresh derived views.
    async fn complete_write_transaction(&self) -> Result<()>;

    /// Flush and release held resources.
    async fn close(&self) -> Result<()>;
}

// =============================================================================
// ETL INPUT
// =============================================================================

/// Producer of identity records for one source.
///
/// Implementations write metadata and records into the store and return the
/// concept IDs they processed.
#[async_trait]
pub trait RecordLoader: Send + Sync {
    fn source(&self) -> SourceName;

    async fn load(&self, store: &dyn DiseaseStore) -> Result<BTreeSet<String>>;
}
