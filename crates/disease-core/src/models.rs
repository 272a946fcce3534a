//! Record model for identity, merged, and source-metadata records.
//!
//! Set-valued fields use [`BTreeSet`] so that two records built from the same
//! input serialize to identical bytes regardless of insertion order.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// SOURCES
// =============================================================================

/// A source vocabulary that contributes identity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceName {
    #[serde(rename = "NCIt")]
    Ncit,
    #[serde(rename = "Mondo")]
    Mondo,
    #[serde(rename = "DO")]
    Do,
    #[serde(rename = "OMIM")]
    Omim,
    #[serde(rename = "OncoTree")]
    OncoTree,
}

impl SourceName {
    /// Every known source, in declaration order.
    pub const ALL: [SourceName; 5] = [
        SourceName::Ncit,
        SourceName::Mondo,
        SourceName::Do,
        SourceName::Omim,
        SourceName::OncoTree,
    ];

    /// Canonical display name, as stored in `src_name`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Ncit => "NCIt",
            SourceName::Mondo => "Mondo",
            SourceName::Do => "DO",
            SourceName::Omim => "OMIM",
            SourceName::OncoTree => "OncoTree",
        }
    }

    /// Namespace prefix carried by this source's concept IDs.
    pub fn namespace_prefix(&self) -> &'static str {
        match self {
            SourceName::Ncit => "ncit",
            SourceName::Mondo => "mondo",
            SourceName::Do => "DOID",
            SourceName::Omim => "MIM",
            SourceName::OncoTree => "oncotree",
        }
    }

    /// Merge priority. Lower values win.
    pub fn priority(&self) -> u8 {
        match self {
            SourceName::Ncit => 1,
            SourceName::Mondo => 2,
            SourceName::Omim => 3,
            SourceName::OncoTree => 4,
            SourceName::Do => 5,
        }
    }

    /// Whether identity records from this source may seed a merge group.
    pub fn is_merge_driver(&self) -> bool {
        matches!(self, SourceName::Mondo)
    }

    /// Resolve a namespace prefix (case-insensitive) to its source.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.namespace_prefix().eq_ignore_ascii_case(prefix))
    }

    /// Resolve the source owning a namespace-prefixed concept ID.
    pub fn from_concept_id(concept_id: &str) -> Option<Self> {
        concept_id
            .split_once(':')
            .and_then(|(prefix, _)| Self::from_prefix(prefix))
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = Error;

    /// Parse a source name, ignoring case (`"ncit"`, `"NCIt"`, `"NCIT"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|src| src.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::InvalidParameter(format!("Invalid source name: {}", trimmed)))
    }
}

/// Sort key placing records in merge/normalize precedence order.
pub fn record_order(src_name: SourceName, concept_id: &str) -> (u8, String) {
    (src_name.priority(), concept_id.to_string())
}

// =============================================================================
// MATCH TIERS
// =============================================================================

/// How a query matched a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    ConceptId,
    Label,
    Alias,
    Xref,
    AssociatedWith,
    NoMatch,
}

impl MatchType {
    /// Relative strength of the match.
    pub fn score(&self) -> u8 {
        match self {
            MatchType::ConceptId => 100,
            MatchType::Label => 80,
            MatchType::Alias | MatchType::Xref | MatchType::AssociatedWith => 60,
            MatchType::NoMatch => 0,
        }
    }
}

/// Kind of reference-index entry. Declared in match precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Label,
    Alias,
    Xref,
    AssociatedWith,
}

impl RefType {
    /// Reference tiers in the order queries must check them.
    pub const TIERS: [RefType; 4] = [
        RefType::Label,
        RefType::Alias,
        RefType::Xref,
        RefType::AssociatedWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Label => "label",
            RefType::Alias => "alias",
            RefType::Xref => "xref",
            RefType::AssociatedWith => "associated_with",
        }
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            RefType::Label => MatchType::Label,
            RefType::Alias => MatchType::Alias,
            RefType::Xref => MatchType::Xref,
            RefType::AssociatedWith => MatchType::AssociatedWith,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyspace selector for primary records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Identity,
    Merger,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Identity => "identity",
            RecordType::Merger => "merger",
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A disease concept as produced by a source ETL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disease {
    pub concept_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    /// Cross-references. Depending on the source these may denote the same
    /// concept elsewhere or arbitrary external links.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub xrefs: BTreeSet<String>,
    /// Loosely related external IDs. Never used for merging.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub associated_with: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pediatric_disease: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oncologic_disease: Option<bool>,
}

impl Disease {
    /// Create a record with only the required fields populated.
    pub fn new(concept_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            concept_id: concept_id.into(),
            label: label.into(),
            aliases: BTreeSet::new(),
            xrefs: BTreeSet::new(),
            associated_with: BTreeSet::new(),
            pediatric_disease: None,
            oncologic_disease: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_xrefs<I, S>(mut self, xrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.xrefs.extend(xrefs.into_iter().map(Into::into));
        self
    }

    pub fn with_associated_with<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.associated_with.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_pediatric(mut self, pediatric: bool) -> Self {
        self.pediatric_disease = Some(pediatric);
        self
    }

    pub fn with_oncologic(mut self, oncologic: bool) -> Self {
        self.oncologic_disease = Some(oncologic);
        self
    }

    /// Values that receive reference-index entries, paired with their tier.
    pub fn reference_terms(&self) -> Vec<(RefType, &str)> {
        let mut terms = Vec::with_capacity(
            1 + self.aliases.len() + self.xrefs.len() + self.associated_with.len(),
        );
        if !self.label.is_empty() {
            terms.push((RefType::Label, self.label.as_str()));
        }
        terms.extend(self.aliases.iter().map(|a| (RefType::Alias, a.as_str())));
        terms.extend(self.xrefs.iter().map(|x| (RefType::Xref, x.as_str())));
        terms.extend(
            self.associated_with
                .iter()
                .map(|a| (RefType::AssociatedWith, a.as_str())),
        );
        terms
    }
}

/// One source's stored representation of a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(flatten)]
    pub disease: Disease,
    pub src_name: SourceName,
    /// Concept ID of the merged record this record belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_ref: Option<String>,
}

impl IdentityRecord {
    pub fn new(disease: Disease, src_name: SourceName) -> Self {
        Self {
            disease,
            src_name,
            merge_ref: None,
        }
    }

    pub fn concept_id(&self) -> &str {
        &self.disease.concept_id
    }

    pub fn order_key(&self) -> (u8, String) {
        record_order(self.src_name, &self.disease.concept_id)
    }
}

/// A normalized concept built from a group of identity records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    /// Concept ID of the highest-priority group member.
    pub concept_id: String,
    pub label: String,
    /// Concept IDs of the other group members. Persisted under `xrefs`, but
    /// unrelated to [`Disease::xrefs`].
    #[serde(rename = "xrefs", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub member_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub associated_with: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pediatric_disease: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oncologic_disease: Option<bool>,
}

impl MergedRecord {
    /// Source of the representative member, derived from the ID namespace.
    pub fn src_name(&self) -> Option<SourceName> {
        SourceName::from_concept_id(&self.concept_id)
    }
}

/// A record yielded by a full-table scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum StoredRecord {
    Identity(IdentityRecord),
    Merger(MergedRecord),
}

impl StoredRecord {
    pub fn concept_id(&self) -> &str {
        match self {
            StoredRecord::Identity(r) => r.concept_id(),
            StoredRecord::Merger(r) => &r.concept_id,
        }
    }
}

// =============================================================================
// SOURCE METADATA
// =============================================================================

/// License attribute flags for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLicenseAttributes {
    pub non_commercial: bool,
    pub share_alike: bool,
    pub attribution: bool,
}

/// License, version, and provenance details for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub data_license: String,
    pub data_license_url: String,
    pub version: String,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub rdp_url: Option<String>,
    pub data_license_attributes: DataLicenseAttributes,
}
