//! Tiered query resolution over a [`DiseaseStore`].
//!
//! Both entry points are read-only. A read failure while checking one
//! source or tier is logged and treated as "no match" there; it never fails
//! the request.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use disease_core::{
    implicit_concept_ids, DiseaseStore, IdentityRecord, InMemoryMetadataCache, MatchType,
    MergedRecord, MetadataCache, RefType, Result, SourceMeta, SourceName,
};

use crate::response::{
    NormalizationResponse, NormalizedDisease, SearchResponse, ServiceMeta, SourceSearchMatches,
};
use crate::sources::SourceFilter;
use crate::warnings::detect_warnings;

/// Answers search and normalize queries.
#[derive(Clone)]
pub struct QueryHandler {
    store: Arc<dyn DiseaseStore>,
    cache: Arc<dyn MetadataCache>,
}

/// A record found during normalize that belongs to no merged concept.
struct Candidate {
    record: IdentityRecord,
    match_type: MatchType,
}

/// Outcome of following a record's `merge_ref`.
enum MergeLookup {
    Unmerged,
    Merged(MergedRecord),
    Dangling,
}

impl QueryHandler {
    /// Handler with a process-local metadata cache.
    pub fn new(store: Arc<dyn DiseaseStore>) -> Self {
        Self::with_cache(store, Arc::new(InMemoryMetadataCache::new()))
    }

    pub fn with_cache(store: Arc<dyn DiseaseStore>, cache: Arc<dyn MetadataCache>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<dyn DiseaseStore> {
        &self.store
    }

    /// Source metadata through the cache. Misses and read failures yield
    /// `None` and are not cached.
    async fn source_meta(&self, src: SourceName) -> Option<SourceMeta> {
        if let Some(meta) = self.cache.get(src) {
            return Some(meta);
        }
        match self.store.get_source_metadata(src).await {
            Ok(Some(meta)) => {
                self.cache.insert(src, meta.clone());
                Some(meta)
            }
            Ok(None) => None,
            Err(e) => {
                error!(
                    subsystem = "search",
                    component = "query",
                    source = %src,
                    error = %e,
                    "Source metadata lookup failed"
                );
                None
            }
        }
    }

    async fn lookup_record(&self, concept_id: &str) -> Option<IdentityRecord> {
        match self.store.get_record_by_id(concept_id, false).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    subsystem = "search",
                    component = "query",
                    concept_id = %concept_id,
                    error = %e,
                    "Record lookup failed"
                );
                None
            }
        }
    }

    async fn lookup_merged(&self, concept_id: &str) -> Option<MergedRecord> {
        match self.store.get_merged_record_by_id(concept_id, false).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    subsystem = "search",
                    component = "query",
                    concept_id = %concept_id,
                    error = %e,
                    "Merged record lookup failed"
                );
                None
            }
        }
    }

    async fn lookup_refs(&self, term: &str, ref_type: RefType) -> Vec<String> {
        match self.store.get_refs_by_type(term, ref_type).await {
            Ok(refs) => refs,
            Err(e) => {
                error!(
                    subsystem = "search",
                    component = "query",
                    query = %term,
                    ref_type = %ref_type,
                    error = %e,
                    "Reference lookup failed"
                );
                Vec::new()
            }
        }
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Best-tier matches from each requested source.
    ///
    /// `incl` and `excl` are comma-separated source names; at most one may
    /// be given. Every requested source appears in the response, with
    /// `NO_MATCH` when nothing matched.
    pub async fn search(
        &self,
        query: &str,
        incl: Option<&str>,
        excl: Option<&str>,
    ) -> Result<SearchResponse> {
        let filter = SourceFilter::parse(incl, excl)?;
        let start = Instant::now();
        let warnings = detect_warnings(query);
        let query = query.trim();

        let mut found: BTreeMap<SourceName, (MatchType, Vec<IdentityRecord>)> = BTreeMap::new();
        if !query.is_empty() {
            self.collect_matches(&query.to_lowercase(), &filter, &mut found)
                .await;
        }

        let mut source_matches = BTreeMap::new();
        for &src in filter.sources() {
            let (match_type, records) = found
                .remove(&src)
                .unwrap_or((MatchType::NoMatch, Vec::new()));
            source_matches.insert(
                src,
                SourceSearchMatches {
                    match_type,
                    records: records.into_iter().map(|r| r.disease).collect(),
                    source_meta: self.source_meta(src).await,
                },
            );
        }

        info!(
            subsystem = "search",
            component = "query",
            op = "search",
            query = %query,
            result_count = source_matches
                .values()
                .filter(|m| m.match_type != MatchType::NoMatch)
                .count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(SearchResponse {
            query: query.to_string(),
            warnings,
            source_matches,
            service_meta: ServiceMeta::now(),
        })
    }

    /// Walk the tiers until every requested source has matched.
    async fn collect_matches(
        &self,
        query: &str,
        filter: &SourceFilter,
        found: &mut BTreeMap<SourceName, (MatchType, Vec<IdentityRecord>)>,
    ) {
        let mut pending: BTreeSet<SourceName> = filter.sources().clone();

        // concept ID, either namespaced or a bare source code
        let mut candidate_ids = Vec::new();
        if SourceName::from_concept_id(query).is_some() {
            candidate_ids.push(query.to_string());
        }
        candidate_ids.extend(implicit_concept_ids(query).into_iter().map(|(_, id)| id));
        for concept_id in candidate_ids {
            if let Some(record) = self.lookup_record(&concept_id).await {
                let src = record.src_name;
                add_match(found, filter, record, MatchType::ConceptId);
                pending.remove(&src);
            }
        }

        for ref_type in RefType::TIERS {
            if pending.is_empty() {
                break;
            }
            let refs = self.lookup_refs(query, ref_type).await;
            debug!(
                subsystem = "search",
                component = "query",
                ref_type = %ref_type,
                result_count = refs.len(),
                "Checked match tier"
            );
            let mut matched = BTreeSet::new();
            for concept_id in refs {
                match self.lookup_record(&concept_id).await {
                    Some(record) => {
                        matched.insert(record.src_name);
                        add_match(found, filter, record, ref_type.match_type());
                    }
                    None => error!(
                        subsystem = "search",
                        component = "query",
                        concept_id = %concept_id,
                        "Reference to missing record"
                    ),
                }
            }
            pending.retain(|src| !matched.contains(src));
        }
    }

    // =========================================================================
    // NORMALIZE
    // =========================================================================

    async fn follow_merge_ref(&self, record: &IdentityRecord, query: &str) -> MergeLookup {
        let Some(merge_ref) = record.merge_ref.as_deref() else {
            return MergeLookup::Unmerged;
        };
        match self.lookup_merged(merge_ref).await {
            Some(merged) => MergeLookup::Merged(merged),
            None => {
                error!(
                    subsystem = "search",
                    component = "query",
                    concept_id = %record.concept_id(),
                    merge_ref = %merge_ref,
                    query = %query,
                    "Merge ref lookup failed"
                );
                MergeLookup::Dangling
            }
        }
    }

    /// The merged concept a query resolves to.
    ///
    /// Checks merged concept IDs, then identity concept IDs, then each
    /// reference tier, taking the first record (by source priority) that
    /// belongs to a merged concept. Failing that, the best record outside
    /// any group is returned as its own concept. A dangling `merge_ref`
    /// ends the lookup with `NO_MATCH`.
    pub async fn normalize(&self, query: &str) -> NormalizationResponse {
        let start = Instant::now();
        let warnings = detect_warnings(query);
        let mut response = NormalizationResponse::no_match(query, warnings);
        let term = query.trim().to_lowercase();
        if term.is_empty() {
            return response;
        }

        let resolved = self.resolve(&term).await;
        match resolved {
            Some((disease, match_type)) => {
                for src in disease.sources() {
                    if let Some(meta) = self.source_meta(src).await {
                        response.source_meta.insert(src, meta);
                    }
                }
                response.match_type = match_type;
                response.normalized_id = Some(disease.primary_code.clone());
                response.disease = Some(disease);
            }
            None => response.match_type = MatchType::NoMatch,
        }

        info!(
            subsystem = "search",
            component = "query",
            op = "normalize",
            query = %term,
            match_type = ?response.match_type,
            duration_ms = start.elapsed().as_millis() as u64,
            "Normalize complete"
        );
        response
    }

    async fn resolve(&self, term: &str) -> Option<(NormalizedDisease, MatchType)> {
        if let Some(merged) = self.lookup_merged(term).await {
            return Some((NormalizedDisease::from_merged(&merged), MatchType::ConceptId));
        }

        let mut candidate: Option<Candidate> = None;
        if let Some(record) = self.lookup_record(term).await {
            match self.follow_merge_ref(&record, term).await {
                MergeLookup::Merged(merged) => {
                    return Some((NormalizedDisease::from_merged(&merged), MatchType::ConceptId))
                }
                MergeLookup::Dangling => return None,
                MergeLookup::Unmerged => {
                    candidate = Some(Candidate {
                        record,
                        match_type: MatchType::ConceptId,
                    })
                }
            }
        }

        for ref_type in RefType::TIERS {
            let mut records = Vec::new();
            for concept_id in self.lookup_refs(term, ref_type).await {
                if let Some(record) = self.lookup_record(&concept_id).await {
                    records.push(record);
                }
            }
            records.sort_by_key(|r| r.order_key());

            for record in records {
                match self.follow_merge_ref(&record, term).await {
                    MergeLookup::Merged(merged) => {
                        return Some((NormalizedDisease::from_merged(&merged), ref_type.match_type()))
                    }
                    MergeLookup::Dangling => return None,
                    MergeLookup::Unmerged => {
                        if candidate.is_none() {
                            candidate = Some(Candidate {
                                record,
                                match_type: ref_type.match_type(),
                            });
                        }
                    }
                }
            }
        }

        candidate.map(|c| (NormalizedDisease::from_identity(&c.record), c.match_type))
    }
}

/// Record a match unless its source is unrequested or already matched at a
/// different tier.
fn add_match(
    found: &mut BTreeMap<SourceName, (MatchType, Vec<IdentityRecord>)>,
    filter: &SourceFilter,
    record: IdentityRecord,
    match_type: MatchType,
) {
    let src = record.src_name;
    if !filter.contains(src) {
        return;
    }
    let (existing_type, records) = found
        .entry(src)
        .or_insert_with(|| (match_type, Vec::new()));
    if *existing_type == match_type
        && !records.iter().any(|r| r.concept_id() == record.concept_id())
    {
        records.push(record);
    }
}
