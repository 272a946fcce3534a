//! Response shapes returned by the query handler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use disease_core::defaults::SERVICE_NAME;
use disease_core::{
    system_uri, Disease, IdentityRecord, MatchType, MergedRecord, SourceMeta, SourceName,
};

use crate::warnings::QueryWarning;

/// Project homepage reported in [`ServiceMeta`].
pub const SERVICE_URL: &str = "https://github.com/cancervariants/disease-normalization";

/// Identifies the service that produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMeta {
    pub name: String,
    pub version: String,
    pub response_datetime: DateTime<Utc>,
    pub url: String,
}

impl ServiceMeta {
    pub fn now() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            response_datetime: Utc::now(),
            url: SERVICE_URL.to_string(),
        }
    }
}

// =============================================================================
// SEARCH
// =============================================================================

/// One source's matches. Every record shares `match_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSearchMatches {
    pub match_type: MatchType,
    pub records: Vec<Disease>,
    /// `None` when the source has no stored metadata.
    #[serde(rename = "source_meta_")]
    pub source_meta: Option<SourceMeta>,
}

/// Matches keyed by source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<QueryWarning>,
    pub source_matches: BTreeMap<SourceName, SourceSearchMatches>,
    #[serde(rename = "service_meta_")]
    pub service_meta: ServiceMeta,
}

/// A [`SourceSearchMatches`] tagged with its source, for list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSourceMatches {
    pub source: SourceName,
    #[serde(flatten)]
    pub matches: SourceSearchMatches,
}

/// [`SearchResponse`] with matches as a flat list in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchListResponse {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<QueryWarning>,
    pub source_matches: Vec<NamedSourceMatches>,
    #[serde(rename = "service_meta_")]
    pub service_meta: ServiceMeta,
}

impl SearchResponse {
    pub fn into_list(self) -> SearchListResponse {
        SearchListResponse {
            query: self.query,
            warnings: self.warnings,
            source_matches: self
                .source_matches
                .into_iter()
                .map(|(source, matches)| NamedSourceMatches { source, matches })
                .collect(),
            service_meta: self.service_meta,
        }
    }
}

// =============================================================================
// NORMALIZE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MappingRelation {
    ExactMatch,
    RelatedMatch,
}

/// A concept ID split into code and code system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    pub id: String,
    pub code: String,
    pub system: String,
}

impl Coding {
    /// Split `prefix:code`, resolving the prefix to its system URI. Unknown
    /// prefixes are kept lower-cased as the system.
    pub fn from_concept_id(concept_id: &str) -> Self {
        let (prefix, code) = concept_id.split_once(':').unwrap_or(("", concept_id));
        let system = system_uri(prefix)
            .map(str::to_string)
            .unwrap_or_else(|| prefix.to_lowercase());
        Self {
            id: concept_id.to_string(),
            code: code.to_string(),
            system,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapping {
    pub coding: Coding,
    pub relation: MappingRelation,
}

impl ConceptMapping {
    fn new(concept_id: &str, relation: MappingRelation) -> Self {
        Self {
            coding: Coding::from_concept_id(concept_id),
            relation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub value: serde_json::Value,
}

/// The normalized concept a query resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDisease {
    /// `normalize.disease.<concept_id>`
    pub id: String,
    pub primary_code: String,
    pub concept_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<ConceptMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
}

impl NormalizedDisease {
    fn build<'a>(
        concept_id: &str,
        label: &str,
        mappings: Vec<ConceptMapping>,
        aliases: impl ExactSizeIterator<Item = &'a String>,
        pediatric: Option<bool>,
        oncologic: Option<bool>,
    ) -> Self {
        let mut extensions = Vec::new();
        if aliases.len() > 0 {
            extensions.push(Extension {
                name: "aliases".to_string(),
                value: serde_json::Value::from(aliases.cloned().collect::<Vec<_>>()),
            });
        }
        if let Some(pediatric) = pediatric {
            extensions.push(Extension {
                name: "pediatric_disease".to_string(),
                value: serde_json::Value::Bool(pediatric),
            });
        }
        if let Some(oncologic) = oncologic {
            extensions.push(Extension {
                name: "oncologic_disease".to_string(),
                value: serde_json::Value::Bool(oncologic),
            });
        }
        Self {
            id: format!("normalize.disease.{}", concept_id),
            primary_code: concept_id.to_string(),
            concept_type: "Disease".to_string(),
            label: label.to_string(),
            mappings,
            extensions,
        }
    }

    /// Group members become exact matches and associated IDs related ones.
    pub fn from_merged(record: &MergedRecord) -> Self {
        let mappings = record
            .member_ids
            .iter()
            .map(|id| ConceptMapping::new(id, MappingRelation::ExactMatch))
            .chain(
                record
                    .associated_with
                    .iter()
                    .map(|id| ConceptMapping::new(id, MappingRelation::RelatedMatch)),
            )
            .collect();
        Self::build(
            &record.concept_id,
            &record.label,
            mappings,
            record.aliases.iter(),
            record.pediatric_disease,
            record.oncologic_disease,
        )
    }

    /// A record outside any group, presented as its own concept. Its xrefs
    /// carry no sameness guarantee, so every mapping is a related match.
    pub fn from_identity(record: &IdentityRecord) -> Self {
        let disease = &record.disease;
        let mappings = disease
            .xrefs
            .iter()
            .chain(disease.associated_with.iter())
            .map(|id| ConceptMapping::new(id, MappingRelation::RelatedMatch))
            .collect();
        Self::build(
            &disease.concept_id,
            &disease.label,
            mappings,
            disease.aliases.iter(),
            disease.pediatric_disease,
            disease.oncologic_disease,
        )
    }

    /// Sources whose metadata should accompany this concept: the owner of
    /// the primary code and of every mapped ID.
    pub fn sources(&self) -> Vec<SourceName> {
        let mut sources: Vec<SourceName> = std::iter::once(self.primary_code.as_str())
            .chain(self.mappings.iter().map(|m| m.coding.id.as_str()))
            .filter_map(SourceName::from_concept_id)
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResponse {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<QueryWarning>,
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<NormalizedDisease>,
    #[serde(
        rename = "source_meta_",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub source_meta: BTreeMap<SourceName, SourceMeta>,
    #[serde(rename = "service_meta_")]
    pub service_meta: ServiceMeta,
}

impl NormalizationResponse {
    pub fn no_match(query: &str, warnings: Vec<QueryWarning>) -> Self {
        Self {
            query: query.to_string(),
            warnings,
            match_type: MatchType::NoMatch,
            normalized_id: None,
            disease: None,
            source_meta: BTreeMap::new(),
            service_meta: ServiceMeta::now(),
        }
    }
}
