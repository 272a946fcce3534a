//! Merged concept generation.
//!
//! Each Mondo driver seeds one group: the driver plus the IDs its record
//! cross-references. Groups are one level deep and are never unioned with
//! each other. IDs claimed by more than one group are reported in
//! [`MergeSummary`] and the last `merge_ref` write for them wins.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use disease_core::{DiseaseStore, IdentityRecord, MergedRecord, Result, SourceName};

/// IDs to merge into one concept, seeded by a driver record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptGroup {
    pub driver_id: String,
    /// The driver plus every ID its record cross-references.
    pub member_ids: BTreeSet<String>,
}

impl ConceptGroup {
    pub fn from_record(record: &IdentityRecord) -> Self {
        let mut member_ids = record.disease.xrefs.clone();
        member_ids.insert(record.concept_id().to_string());
        Self {
            driver_id: record.concept_id().to_string(),
            member_ids,
        }
    }
}

/// Outcome of a merge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub drivers_processed: usize,
    pub groups_built: usize,
    pub merged_written: usize,
    /// Drivers that were not Mondo IDs or did not resolve to a record.
    pub skipped_drivers: Vec<String>,
    /// Non-driver IDs that appear in more than one group, mapped to the
    /// drivers whose groups claim them.
    pub overlapping_ids: BTreeMap<String, BTreeSet<String>>,
}

/// Non-driver member IDs shared by two or more groups.
pub fn find_overlaps(groups: &[ConceptGroup]) -> BTreeMap<String, BTreeSet<String>> {
    let drivers: BTreeSet<&str> = groups.iter().map(|g| g.driver_id.as_str()).collect();
    let mut claims: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for group in groups {
        for id in &group.member_ids {
            if !drivers.contains(id.as_str()) {
                claims
                    .entry(id.clone())
                    .or_default()
                    .insert(group.driver_id.clone());
            }
        }
    }
    claims.retain(|_, drivers| drivers.len() > 1);
    claims
}

/// Combine resolved group members into one merged record.
///
/// Members are ranked by source priority, then concept ID. The first
/// member supplies the concept ID. Scalars come from the first member that
/// defines them and set fields are unioned. Returns `None` for an empty
/// group.
pub fn merge_records(mut records: Vec<IdentityRecord>) -> Option<MergedRecord> {
    records.sort_by_key(|r| r.order_key());
    let (first, rest) = records.split_first()?;

    let mut merged = MergedRecord {
        concept_id: first.concept_id().to_string(),
        label: String::new(),
        member_ids: rest.iter().map(|r| r.concept_id().to_string()).collect(),
        aliases: BTreeSet::new(),
        associated_with: BTreeSet::new(),
        pediatric_disease: None,
        oncologic_disease: None,
    };

    for record in &records {
        let disease = &record.disease;
        merged.aliases.extend(disease.aliases.iter().cloned());
        merged
            .associated_with
            .extend(disease.associated_with.iter().cloned());
        if merged.label.is_empty() && !disease.label.is_empty() {
            merged.label = disease.label.clone();
        }
        if merged.pediatric_disease.is_none() {
            merged.pediatric_disease = disease.pediatric_disease;
        }
        if merged.oncologic_disease.is_none() {
            merged.oncologic_disease = disease.oncologic_disease;
        }
    }

    Some(merged)
}

/// Builds merged records from driver IDs against a store.
pub struct Merge<'a> {
    store: &'a dyn DiseaseStore,
}

impl<'a> Merge<'a> {
    pub fn new(store: &'a dyn DiseaseStore) -> Self {
        Self { store }
    }

    /// Build one group per resolvable Mondo driver, in driver ID order.
    pub async fn build_groups(
        &self,
        driver_ids: &BTreeSet<String>,
        summary: &mut MergeSummary,
    ) -> Result<Vec<ConceptGroup>> {
        let mut groups = Vec::with_capacity(driver_ids.len());
        for driver_id in driver_ids {
            summary.drivers_processed += 1;
            if SourceName::from_concept_id(driver_id) != Some(SourceName::Mondo) {
                warn!(
                    subsystem = "etl",
                    component = "merge",
                    concept_id = %driver_id,
                    "Skipping non-Mondo driver"
                );
                summary.skipped_drivers.push(driver_id.clone());
                continue;
            }
            match self.store.get_record_by_id(driver_id, true).await? {
                Some(record) => groups.push(ConceptGroup::from_record(&record)),
                None => {
                    error!(
                        subsystem = "etl",
                        component = "merge",
                        concept_id = %driver_id,
                        "Driver record not found"
                    );
                    summary.skipped_drivers.push(driver_id.clone());
                }
            }
        }
        summary.groups_built = groups.len();
        Ok(groups)
    }

    /// Fetch every member of a group, dropping IDs that do not resolve.
    async fn resolve_group(&self, group: &ConceptGroup) -> Result<Vec<IdentityRecord>> {
        let mut records = Vec::with_capacity(group.member_ids.len());
        for member_id in &group.member_ids {
            match self.store.get_record_by_id(member_id, true).await? {
                Some(record) => records.push(record),
                None => error!(
                    subsystem = "etl",
                    component = "merge",
                    concept_id = %member_id,
                    driver = %group.driver_id,
                    "Could not retrieve group member"
                ),
            }
        }
        Ok(records)
    }

    /// Group the drivers, write merged records, and point every resolved
    /// member at its merged record.
    ///
    /// A `merge_ref` update on a record that vanished aborts the pass.
    pub async fn create_merged_concepts(
        &self,
        driver_ids: &BTreeSet<String>,
    ) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();

        info!(
            subsystem = "etl",
            component = "merge",
            op = "build_groups",
            record_count = driver_ids.len(),
            "Generating record ID sets"
        );
        let start = Instant::now();
        let groups = self.build_groups(driver_ids, &mut summary).await?;
        self.store.complete_write_transaction().await?;
        debug!(
            subsystem = "etl",
            component = "merge",
            op = "build_groups",
            result_count = groups.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Built record ID sets"
        );

        summary.overlapping_ids = find_overlaps(&groups);
        for (concept_id, drivers) in &summary.overlapping_ids {
            warn!(
                subsystem = "etl",
                component = "merge",
                concept_id = %concept_id,
                drivers = ?drivers,
                "ID belongs to more than one group"
            );
        }

        let start = Instant::now();
        for group in &groups {
            let records = self.resolve_group(group).await?;
            let member_ids: Vec<String> =
                records.iter().map(|r| r.concept_id().to_string()).collect();
            let Some(merged) = merge_records(records) else {
                error!(
                    subsystem = "etl",
                    component = "merge",
                    concept_id = %group.driver_id,
                    "No group members resolved"
                );
                continue;
            };
            trace!(
                subsystem = "etl",
                component = "merge",
                concept_id = %merged.concept_id,
                record_count = member_ids.len(),
                "Writing merged record"
            );
            self.store.add_merged_record(&merged).await?;
            for member_id in &member_ids {
                self.store.update_merge_ref(member_id, &merged.concept_id).await?;
            }
            summary.merged_written += 1;
        }
        self.store.complete_write_transaction().await?;

        info!(
            subsystem = "etl",
            component = "merge",
            op = "create_merged_concepts",
            result_count = summary.merged_written,
            duration_ms = start.elapsed().as_millis() as u64,
            "Merged concept generation successful"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disease_core::Disease;

    fn record(src: SourceName, disease: Disease) -> IdentityRecord {
        IdentityRecord::new(disease, src)
    }

    #[test]
    fn test_representative_is_highest_priority() {
        let merged = merge_records(vec![
            record(SourceName::Do, Disease::new("DOID:769", "neuroblastoma")),
            record(SourceName::Mondo, Disease::new("mondo:0005072", "neuroblastoma")),
            record(SourceName::Ncit, Disease::new("ncit:C3270", "Neuroblastoma")),
        ])
        .unwrap();

        assert_eq!(merged.concept_id, "ncit:C3270");
        assert_eq!(merged.label, "Neuroblastoma");
        assert_eq!(
            merged.member_ids,
            ["DOID:769".to_string(), "mondo:0005072".to_string()]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_ties_break_on_concept_id() {
        let merged = merge_records(vec![
            record(SourceName::Ncit, Disease::new("ncit:C9", "b")),
            record(SourceName::Ncit, Disease::new("ncit:C10", "a")),
        ])
        .unwrap();
        assert_eq!(merged.concept_id, "ncit:C10");
        assert_eq!(merged.label, "a");
    }

    #[test]
    fn test_scalars_are_first_wins() {
        let merged = merge_records(vec![
            record(
                SourceName::Mondo,
                Disease::new("mondo:1", "m").with_pediatric(false).with_oncologic(true),
            ),
            record(SourceName::Ncit, Disease::new("ncit:C1", "n").with_oncologic(false)),
        ])
        .unwrap();
        assert_eq!(merged.pediatric_disease, Some(false));
        assert_eq!(merged.oncologic_disease, Some(false));
    }

    #[test]
    fn test_sets_are_unioned() {
        let merged = merge_records(vec![
            record(
                SourceName::Mondo,
                Disease::new("mondo:1", "m")
                    .with_aliases(["a", "b"])
                    .with_associated_with(["umls:C1"]),
            ),
            record(SourceName::Ncit, Disease::new("ncit:C1", "n").with_aliases(["b", "c"])),
        ])
        .unwrap();
        assert_eq!(merged.aliases.len(), 3);
        assert_eq!(merged.associated_with.len(), 1);
    }

    #[test]
    fn test_singleton_group_has_no_member_ids() {
        let merged = merge_records(vec![record(SourceName::Mondo, Disease::new("mondo:1", "m"))])
            .unwrap();
        assert_eq!(merged.concept_id, "mondo:1");
        assert!(merged.member_ids.is_empty());
        assert!(merged.aliases.is_empty());

        let json = serde_json::to_value(&merged).unwrap();
        assert!(json.get("xrefs").is_none());
        assert!(json.get("aliases").is_none());
    }

    #[test]
    fn test_empty_group() {
        assert!(merge_records(Vec::new()).is_none());
    }

    #[test]
    fn test_find_overlaps_ignores_drivers() {
        let groups = vec![
            ConceptGroup {
                driver_id: "mondo:1".into(),
                member_ids: ["mondo:1", "ncit:C1", "mondo:2"].iter().map(|s| s.to_string()).collect(),
            },
            ConceptGroup {
                driver_id: "mondo:2".into(),
                member_ids: ["mondo:2", "ncit:C1", "DOID:1"].iter().map(|s| s.to_string()).collect(),
            },
        ];
        let overlaps = find_overlaps(&groups);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps["ncit:C1"].len(), 2);
    }
}
