//! PostgreSQL storage backend.
//!
//! Identity records are split across `disease_concepts` and one table per
//! reference kind; lookups go through the `record_lookup_view` materialized
//! view, which is refreshed by
//! [`complete_write_transaction`](DiseaseStore::complete_write_transaction).

pub mod schema;

use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use disease_core::defaults::SCAN_PAGE_SIZE;
use disease_core::{
    DataLicenseAttributes, Disease, DiseaseStore, Error, IdentityRecord, MergedRecord, RecordType,
    RefType, Result, SourceMeta, SourceName, StoredRecord,
};

use crate::guard::DropGuard;
use crate::pool::{create_pool, log_pool_metrics};
use crate::StoreContext;

fn read_err(e: sqlx::Error) -> Error {
    Error::DatabaseRead(e.to_string())
}

fn write_err(e: sqlx::Error) -> Error {
    Error::DatabaseWrite(e.to_string())
}

fn init_err(e: sqlx::Error) -> Error {
    Error::DatabaseInitialization(e.to_string())
}

fn to_set(values: Option<Vec<String>>) -> BTreeSet<String> {
    values.unwrap_or_default().into_iter().collect()
}

fn to_array(values: &BTreeSet<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().cloned().collect())
    }
}

const IDENTITY_COLUMNS: &str = "concept_id, label, aliases, associated_with, xrefs, source, \
     merge_ref, pediatric_disease, oncologic_disease";

const MERGED_COLUMNS: &str =
    "concept_id, label, aliases, associated_with, xrefs, pediatric_disease, oncologic_disease";

fn identity_from_row(row: &PgRow) -> Result<IdentityRecord> {
    let source: String = row.try_get("source").map_err(read_err)?;
    let src_name = source
        .parse::<SourceName>()
        .map_err(|_| Error::DatabaseRead(format!("unknown source in row: {}", source)))?;
    let label: Option<String> = row.try_get("label").map_err(read_err)?;
    let disease = Disease {
        concept_id: row.try_get("concept_id").map_err(read_err)?,
        label: label.unwrap_or_default(),
        aliases: to_set(row.try_get("aliases").map_err(read_err)?),
        xrefs: to_set(row.try_get("xrefs").map_err(read_err)?),
        associated_with: to_set(row.try_get("associated_with").map_err(read_err)?),
        pediatric_disease: row.try_get("pediatric_disease").map_err(read_err)?,
        oncologic_disease: row.try_get("oncologic_disease").map_err(read_err)?,
    };
    Ok(IdentityRecord {
        disease,
        src_name,
        merge_ref: row.try_get("merge_ref").map_err(read_err)?,
    })
}

fn merged_from_row(row: &PgRow) -> Result<MergedRecord> {
    let label: Option<String> = row.try_get("label").map_err(read_err)?;
    Ok(MergedRecord {
        concept_id: row.try_get("concept_id").map_err(read_err)?,
        label: label.unwrap_or_default(),
        member_ids: to_set(row.try_get("xrefs").map_err(read_err)?),
        aliases: to_set(row.try_get("aliases").map_err(read_err)?),
        associated_with: to_set(row.try_get("associated_with").map_err(read_err)?),
        pediatric_disease: row.try_get("pediatric_disease").map_err(read_err)?,
        oncologic_disease: row.try_get("oncologic_disease").map_err(read_err)?,
    })
}

/// Position of a paginated record scan.
#[derive(Debug, Clone)]
enum ScanPhase {
    Merged(String),
    Unmerged(String),
    Identity(String),
    Done,
}

/// Relational store over a PostgreSQL connection pool.
pub struct PgDiseaseStore {
    pool: PgPool,
    guard: DropGuard,
}

impl PgDiseaseStore {
    pub fn new(pool: PgPool, guard: DropGuard) -> Self {
        Self { pool, guard }
    }

    /// Connect using the context's pool settings.
    pub async fn connect(database_url: &str, context: StoreContext) -> Result<Self> {
        let pool = create_pool(database_url, &context.pool).await?;
        Ok(Self::new(pool, context.drop_guard))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn add_fkeys(&self) -> Result<()> {
        self.execute_script(schema::DROP_FKEYS).await?;
        self.execute_script(schema::ADD_FKEYS).await
    }

    async fn refresh_view(&self) -> Result<()> {
        let start = Instant::now();
        sqlx::query(schema::REFRESH_VIEW)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        debug!(
            subsystem = "db",
            component = "postgres",
            op = "refresh_view",
            duration_ms = start.elapsed().as_millis() as u64,
            "Refreshed {}",
            schema::LOOKUP_VIEW
        );
        Ok(())
    }

    async fn existing_tables(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query(
            "SELECT table_name::text AS name FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(read_err))
            .collect()
    }

    async fn fetch_page(&self, phase: ScanPhase) -> Result<(Vec<StoredRecord>, ScanPhase)> {
        let limit = SCAN_PAGE_SIZE as i64;
        let (sql, cursor) = match &phase {
            ScanPhase::Merged(c) => (
                format!(
                    "SELECT {} FROM disease_merged WHERE concept_id > $1 ORDER BY concept_id LIMIT $2",
                    MERGED_COLUMNS
                ),
                c.clone(),
            ),
            ScanPhase::Unmerged(c) => (
                format!(
                    "SELECT {} FROM record_lookup_view WHERE merge_ref IS NULL AND concept_id > $1 \
                     ORDER BY concept_id LIMIT $2",
                    IDENTITY_COLUMNS
                ),
                c.clone(),
            ),
            ScanPhase::Identity(c) => (
                format!(
                    "SELECT {} FROM record_lookup_view WHERE concept_id > $1 ORDER BY concept_id LIMIT $2",
                    IDENTITY_COLUMNS
                ),
                c.clone(),
            ),
            ScanPhase::Done => return Ok((Vec::new(), ScanPhase::Done)),
        };

        let rows = sqlx::query(&sql)
            .bind(&cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;

        let records = rows
            .iter()
            .map(|row| match &phase {
                ScanPhase::Merged(_) => merged_from_row(row).map(StoredRecord::Merger),
                _ => identity_from_row(row).map(StoredRecord::Identity),
            })
            .collect::<Result<Vec<_>>>()?;

        let full_page = rows.len() as i64 == limit;
        let last = records.last().map(|r| r.concept_id().to_string());
        let next = match (phase, last, full_page) {
            (ScanPhase::Merged(_), Some(last), true) => ScanPhase::Merged(last),
            (ScanPhase::Merged(_), _, _) => ScanPhase::Unmerged(String::new()),
            (ScanPhase::Unmerged(_), Some(last), true) => ScanPhase::Unmerged(last),
            (ScanPhase::Identity(_), Some(last), true) => ScanPhase::Identity(last),
            _ => ScanPhase::Done,
        };
        Ok((records, next))
    }
}

#[async_trait]
impl DiseaseStore for PgDiseaseStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.existing_tables().await?.into_iter().collect())
    }

    async fn initialize_db(&self) -> Result<()> {
        if self.check_schema_initialized().await? {
            return Ok(());
        }
        let start = Instant::now();
        sqlx::raw_sql(schema::CREATE_TABLES)
            .execute(&self.pool)
            .await
            .map_err(init_err)?;
        sqlx::raw_sql(schema::DROP_FKEYS)
            .execute(&self.pool)
            .await
            .map_err(init_err)?;
        sqlx::raw_sql(schema::ADD_FKEYS)
            .execute(&self.pool)
            .await
            .map_err(init_err)?;
        sqlx::raw_sql(schema::CREATE_VIEW)
            .execute(&self.pool)
            .await
            .map_err(init_err)?;
        sqlx::raw_sql(schema::ADD_INDEXES)
            .execute(&self.pool)
            .await
            .map_err(init_err)?;
        info!(
            subsystem = "db",
            component = "postgres",
            op = "initialize_db",
            duration_ms = start.elapsed().as_millis() as u64,
            "Created disease normalizer schema"
        );
        Ok(())
    }

    async fn check_schema_initialized(&self) -> Result<bool> {
        let existing = self.existing_tables().await?;
        if let Some(missing) = schema::TABLES.iter().find(|t| !existing.contains(**t)) {
            info!(subsystem = "db", component = "postgres", db_table = *missing, "Disease table existence check failed");
            return Ok(false);
        }
        let view: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM pg_matviews WHERE schemaname = current_schema() AND matviewname = $1",
        )
        .bind(schema::LOOKUP_VIEW)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        if view.is_none() {
            info!(subsystem = "db", component = "postgres", "Disease normalized view lookup failed");
            return Ok(false);
        }
        Ok(true)
    }

    async fn check_tables_populated(&self) -> Result<bool> {
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM disease_sources")
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        if (sources as usize) < SourceName::ALL.len() {
            info!(subsystem = "db", component = "postgres", "Disease sources table is missing expected sources");
            return Ok(false);
        }
        let concepts: Option<i32> = sqlx::query_scalar("SELECT 1 FROM disease_concepts LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        if concepts.is_none() {
            info!(subsystem = "db", component = "postgres", "Disease records table is empty");
            return Ok(false);
        }
        let merged: Option<i32> = sqlx::query_scalar("SELECT 1 FROM disease_merged LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        if merged.is_none() {
            info!(subsystem = "db", component = "postgres", "Normalized disease records table is empty");
            return Ok(false);
        }
        Ok(true)
    }

    async fn drop_db(&self) -> Result<()> {
        if !self.guard.check()? {
            info!(subsystem = "db", component = "postgres", op = "drop_db", "Drop not confirmed");
            return Ok(());
        }
        self.execute_script(schema::DROP_ALL).await?;
        info!(subsystem = "db", component = "postgres", op = "drop_db", "Dropped all existing disease normalizer tables");
        Ok(())
    }

    async fn get_source_metadata(&self, src: SourceName) -> Result<Option<SourceMeta>> {
        let row = sqlx::query(
            "SELECT data_license, data_license_url, version, data_url, rdp_url,
                    data_license_nc, data_license_attr, data_license_sa
             FROM disease_sources WHERE name = $1",
        )
        .bind(src.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        row.map(|r| {
            Ok(SourceMeta {
                data_license: r.try_get("data_license").map_err(read_err)?,
                data_license_url: r.try_get("data_license_url").map_err(read_err)?,
                version: r.try_get("version").map_err(read_err)?,
                data_url: r.try_get("data_url").map_err(read_err)?,
                rdp_url: r.try_get("rdp_url").map_err(read_err)?,
                data_license_attributes: DataLicenseAttributes {
                    non_commercial: r.try_get("data_license_nc").map_err(read_err)?,
                    attribution: r.try_get("data_license_attr").map_err(read_err)?,
                    share_alike: r.try_get("data_license_sa").map_err(read_err)?,
                },
            })
        })
        .transpose()
    }

    async fn add_source_metadata(&self, src: SourceName, meta: &SourceMeta) -> Result<()> {
        sqlx::query(
            "INSERT INTO disease_sources (
                name, data_license, data_license_url, version, data_url, rdp_url,
                data_license_nc, data_license_attr, data_license_sa
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (name) DO UPDATE SET
                data_license = EXCLUDED.data_license,
                data_license_url = EXCLUDED.data_license_url,
                version = EXCLUDED.version,
                data_url = EXCLUDED.data_url,
                rdp_url = EXCLUDED.rdp_url,
                data_license_nc = EXCLUDED.data_license_nc,
                data_license_attr = EXCLUDED.data_license_attr,
                data_license_sa = EXCLUDED.data_license_sa",
        )
        .bind(src.as_str())
        .bind(&meta.data_license)
        .bind(&meta.data_license_url)
        .bind(&meta.version)
        .bind(&meta.data_url)
        .bind(&meta.rdp_url)
        .bind(meta.data_license_attributes.non_commercial)
        .bind(meta.data_license_attributes.attribution)
        .bind(meta.data_license_attributes.share_alike)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn add_record(&self, record: &Disease, src: SourceName) -> Result<()> {
        let concept_id = record.concept_id.as_str();
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        sqlx::query(
            "INSERT INTO disease_concepts (concept_id, source, pediatric_disease, oncologic_disease)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (concept_id) DO UPDATE SET
                source = EXCLUDED.source,
                pediatric_disease = EXCLUDED.pediatric_disease,
                oncologic_disease = EXCLUDED.oncologic_disease,
                merge_ref = NULL",
        )
        .bind(concept_id)
        .bind(src.as_str())
        .bind(record.pediatric_disease)
        .bind(record.oncologic_disease)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for table in ["disease_labels", "disease_aliases", "disease_xrefs", "disease_associations"] {
            sqlx::query(&format!("DELETE FROM {} WHERE concept_id = $1", table))
                .bind(concept_id)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }

        if !record.label.is_empty() {
            sqlx::query("INSERT INTO disease_labels (label, concept_id) VALUES ($1, $2)")
                .bind(&record.label)
                .bind(concept_id)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }

        let references: [(&str, &str, &BTreeSet<String>); 3] = [
            ("disease_aliases", "alias", &record.aliases),
            ("disease_xrefs", "xref", &record.xrefs),
            ("disease_associations", "associated_with", &record.associated_with),
        ];
        for (table, column, values) in references {
            if values.is_empty() {
                continue;
            }
            let values: Vec<String> = values.iter().cloned().collect();
            sqlx::query(&format!(
                "INSERT INTO {} ({}, concept_id) SELECT unnest($1::text[]), $2",
                table, column
            ))
            .bind(&values)
            .bind(concept_id)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        Ok(())
    }

    async fn add_merged_record(&self, record: &MergedRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO disease_merged (
                concept_id, label, aliases, associated_with, xrefs,
                pediatric_disease, oncologic_disease
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (concept_id) DO UPDATE SET
                label = EXCLUDED.label,
                aliases = EXCLUDED.aliases,
                associated_with = EXCLUDED.associated_with,
                xrefs = EXCLUDED.xrefs,
                pediatric_disease = EXCLUDED.pediatric_disease,
                oncologic_disease = EXCLUDED.oncologic_disease",
        )
        .bind(&record.concept_id)
        .bind(&record.label)
        .bind(to_array(&record.aliases))
        .bind(to_array(&record.associated_with))
        .bind(to_array(&record.member_ids))
        .bind(record.pediatric_disease)
        .bind(record.oncologic_disease)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn get_record_by_id(
        &self,
        concept_id: &str,
        case_sensitive: bool,
    ) -> Result<Option<IdentityRecord>> {
        let sql = if case_sensitive {
            format!("SELECT {} FROM record_lookup_view WHERE concept_id = $1", IDENTITY_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM record_lookup_view WHERE concept_id_lowercase = lower($1)
                 ORDER BY concept_id LIMIT 1",
                IDENTITY_COLUMNS
            )
        };
        let row = sqlx::query(&sql)
            .bind(concept_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn get_merged_record_by_id(
        &self,
        concept_id: &str,
        case_sensitive: bool,
    ) -> Result<Option<MergedRecord>> {
        let sql = if case_sensitive {
            format!("SELECT {} FROM disease_merged WHERE concept_id = $1", MERGED_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM disease_merged WHERE lower(concept_id) = lower($1)
                 ORDER BY concept_id LIMIT 1",
                MERGED_COLUMNS
            )
        };
        let row = sqlx::query(&sql)
            .bind(concept_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(merged_from_row).transpose()
    }

    async fn get_refs_by_type(&self, term: &str, ref_type: RefType) -> Result<Vec<String>> {
        let (table, column) = match ref_type {
            RefType::Label => ("disease_labels", "label"),
            RefType::Alias => ("disease_aliases", "alias"),
            RefType::Xref => ("disease_xrefs", "xref"),
            RefType::AssociatedWith => ("disease_associations", "associated_with"),
        };
        let ids: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT concept_id FROM {} WHERE lower({}) = lower($1)",
            table, column
        ))
        .bind(term)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;
        // byte order and no duplicates, matching the wide-column layout
        Ok(ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }

    async fn get_all_concept_ids(&self, source: Option<SourceName>) -> Result<BTreeSet<String>> {
        let ids: Vec<String> = match source {
            Some(src) => sqlx::query_scalar("SELECT concept_id FROM disease_concepts WHERE source = $1")
                .bind(src.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(read_err)?,
            None => sqlx::query_scalar("SELECT concept_id FROM disease_concepts")
                .fetch_all(&self.pool)
                .await
                .map_err(read_err)?,
        };
        Ok(ids.into_iter().collect())
    }

    fn all_records(&self, record_type: RecordType) -> BoxStream<'_, Result<StoredRecord>> {
        let start = match record_type {
            RecordType::Merger => ScanPhase::Merged(String::new()),
            RecordType::Identity => ScanPhase::Identity(String::new()),
        };
        stream::try_unfold(start, move |phase| async move {
            if matches!(phase, ScanPhase::Done) {
                return Ok::<_, Error>(None);
            }
            let (records, next) = self.fetch_page(phase).await?;
            Ok(Some((records, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<StoredRecord, Error>)))
        .try_flatten()
        .boxed()
    }

    async fn update_merge_ref(&self, concept_id: &str, merge_ref: &str) -> Result<()> {
        let result = sqlx::query("UPDATE disease_concepts SET merge_ref = $1 WHERE concept_id = $2")
            .bind(merge_ref)
            .bind(concept_id)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("No such record exists for concept {}", concept_id)));
        }
        Ok(())
    }

    async fn delete_source(&self, src: SourceName) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for table in ["disease_labels", "disease_aliases", "disease_xrefs", "disease_associations"] {
            sqlx::query(&format!(
                "DELETE FROM {} t USING disease_concepts dc
                 WHERE dc.concept_id = t.concept_id AND dc.source = $1",
                table
            ))
            .bind(src.as_str())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }
        tx.commit().await.map_err(write_err)?;

        self.execute_script(schema::DROP_FKEYS).await?;
        self.execute_script(schema::DROP_INDEXES).await?;

        let mut tx = self.pool.begin().await.map_err(write_err)?;
        let deleted = sqlx::query("DELETE FROM disease_concepts WHERE source = $1")
            .bind(src.as_str())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?
            .rows_affected();
        sqlx::query("DELETE FROM disease_sources WHERE name = $1")
            .bind(src.as_str())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        tx.commit().await.map_err(write_err)?;

        self.add_fkeys().await?;
        self.execute_script(schema::ADD_INDEXES).await?;
        self.refresh_view().await?;

        info!(
            subsystem = "db",
            component = "postgres",
            op = "delete_source",
            source = %src,
            record_count = deleted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Deleted source records"
        );
        Ok(())
    }

    async fn delete_normalized_concepts(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        sqlx::query("UPDATE disease_concepts SET merge_ref = NULL WHERE merge_ref IS NOT NULL")
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        let deleted = sqlx::query("DELETE FROM disease_merged")
            .execute(&mut *tx)
            .await
            .map_err(write_err)?
            .rows_affected();
        tx.commit().await.map_err(write_err)?;
        self.refresh_view().await?;
        info!(
            subsystem = "db",
            component = "postgres",
            op = "delete_normalized_concepts",
            record_count = deleted,
            "Deleted normalized records"
        );
        Ok(())
    }

    async fn complete_write_transaction(&self) -> Result<()> {
        log_pool_metrics(&self.pool);
        self.refresh_view().await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
