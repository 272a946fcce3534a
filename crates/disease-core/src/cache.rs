//! Source metadata caching for the query path.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{SourceMeta, SourceName};

/// Cache for source metadata looked up while answering queries.
///
/// Entries are never invalidated; a process sees the metadata it first read.
pub trait MetadataCache: Send + Sync {
    fn get(&self, src: SourceName) -> Option<SourceMeta>;

    fn insert(&self, src: SourceName, meta: SourceMeta);
}

/// Process-local cache backed by a lock-protected map.
#[derive(Debug, Default)]
pub struct InMemoryMetadataCache {
    entries: RwLock<HashMap<SourceName, SourceMeta>>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for InMemoryMetadataCache {
    fn get(&self, src: SourceName) -> Option<SourceMeta> {
        match self.entries.read() {
            Ok(entries) => entries.get(&src).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&src).cloned(),
        }
    }

    fn insert(&self, src: SourceName, meta: SourceMeta) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.entry(src).or_insert(meta);
            }
            Err(poisoned) => {
                poisoned.into_inner().entry(src).or_insert(meta);
            }
        }
    }
}

/// Cache that stores nothing, so every lookup reaches the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughMetadataCache;

impl MetadataCache for PassThroughMetadataCache {
    fn get(&self, _src: SourceName) -> Option<SourceMeta> {
        None
    }

    fn insert(&self, _src: SourceName, _meta: SourceMeta) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataLicenseAttributes;

    fn meta(version: &str) -> SourceMeta {
        SourceMeta {
            data_license: "CC BY 4.0".into(),
            data_license_url: "https://creativecommons.org/licenses/by/4.0/legalcode".into(),
            version: version.into(),
            data_url: None,
            rdp_url: None,
            data_license_attributes: DataLicenseAttributes {
                non_commercial: false,
                share_alike: false,
                attribution: true,
            },
        }
    }

    #[test]
    fn test_in_memory_cache_roundtrip() {
        let cache = InMemoryMetadataCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(SourceName::Mondo).is_none());

        cache.insert(SourceName::Mondo, meta("2024-01-03"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(SourceName::Mondo).unwrap().version, "2024-01-03");
    }

    #[test]
    fn test_in_memory_cache_is_never_invalidated() {
        let cache = InMemoryMetadataCache::new();
        cache.insert(SourceName::Do, meta("v1"));
        cache.insert(SourceName::Do, meta("v2"));
        assert_eq!(cache.get(SourceName::Do).unwrap().version, "v1");
    }

    #[test]
    fn test_pass_through_cache_stores_nothing() {
        let cache = PassThroughMetadataCache;
        cache.insert(SourceName::Ncit, meta("23.09d"));
        assert!(cache.get(SourceName::Ncit).is_none());
    }
}
