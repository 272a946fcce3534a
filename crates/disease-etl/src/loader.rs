//! Loading pre-transformed source records.
//!
//! Source-specific parsing happens upstream. A [`JsonLinesLoader`] expects
//! two files per source in its data directory:
//!
//! - `<source>_meta.json`: a single [`SourceMeta`] object
//! - `<source>.jsonl`: one [`Disease`] object per line
//!
//! where `<source>` is the lower-cased source name (`ncit`, `mondo`, `do`,
//! `omim`, `oncotree`).

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use disease_core::defaults::MAX_ALIASES;
use disease_core::{Disease, DiseaseStore, Error, RecordLoader, Result, SourceMeta, SourceName};

/// Reads one source's metadata and records from JSON files.
#[derive(Debug, Clone)]
pub struct JsonLinesLoader {
    src: SourceName,
    data_dir: PathBuf,
}

impl JsonLinesLoader {
    pub fn new(src: SourceName, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            src,
            data_dir: data_dir.into(),
        }
    }

    /// One loader per source, all reading from `data_dir`.
    pub fn for_all_sources(data_dir: impl AsRef<Path>) -> Vec<Arc<dyn RecordLoader>> {
        SourceName::ALL
            .iter()
            .map(|&src| Arc::new(Self::new(src, data_dir.as_ref())) as Arc<dyn RecordLoader>)
            .collect()
    }

    fn file_stem(&self) -> String {
        self.src.as_str().to_lowercase()
    }

    pub fn meta_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}_meta.json", self.file_stem()))
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.jsonl", self.file_stem()))
    }

    async fn read(path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))))
    }
}

/// Apply the input rules every stored record obeys.
///
/// Records without a label are rejected. A record with more than
/// [`MAX_ALIASES`] distinct (case-insensitive) aliases loses all of them.
pub fn prepare_record(mut disease: Disease) -> Result<Disease> {
    if disease.concept_id.trim().is_empty() {
        return Err(Error::InvalidParameter("record is missing concept_id".to_string()));
    }
    if disease.label.trim().is_empty() {
        return Err(Error::InvalidParameter(format!(
            "record {} is missing a label",
            disease.concept_id
        )));
    }
    let distinct: HashSet<String> = disease.aliases.iter().map(|a| a.to_lowercase()).collect();
    if distinct.len() > MAX_ALIASES {
        debug!(
            subsystem = "etl",
            component = "loader",
            concept_id = %disease.concept_id,
            "Record has more than {} aliases, dropping them",
            MAX_ALIASES
        );
        disease.aliases.clear();
    }
    Ok(disease)
}

#[async_trait]
impl RecordLoader for JsonLinesLoader {
    fn source(&self) -> SourceName {
        self.src
    }

    async fn load(&self, store: &dyn DiseaseStore) -> Result<BTreeSet<String>> {
        let start = Instant::now();

        let meta: SourceMeta = serde_json::from_str(&Self::read(&self.meta_path()).await?)?;
        store.add_source_metadata(self.src, &meta).await?;

        let path = self.records_path();
        let contents = Self::read(&path).await?;
        let mut processed = BTreeSet::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let disease: Disease = serde_json::from_str(line).map_err(|e| {
                Error::Serialization(format!("{}:{}: {}", path.display(), index + 1, e))
            })?;
            let disease = prepare_record(disease)?;
            store.add_record(&disease, self.src).await?;
            processed.insert(disease.concept_id);
        }
        store.complete_write_transaction().await?;

        info!(
            subsystem = "etl",
            component = "loader",
            source = %self.src,
            version = %meta.version,
            record_count = processed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Loaded source records"
        );
        Ok(processed)
    }
}
