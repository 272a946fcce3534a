//! Property tests: merge determinism and group invariants.

use std::collections::BTreeSet;

use futures::TryStreamExt;
use proptest::prelude::*;

use disease_db::test_fixtures::{neuroblastoma_records, memory_store};
use disease_db::{Disease, IdentityRecord, RecordType, SourceName, StoredRecord};
use disease_etl::{find_overlaps, merge_records, update_normalized, ConceptGroup};

fn arb_source() -> impl Strategy<Value = SourceName> {
    prop::sample::select(SourceName::ALL.to_vec())
}

fn arb_member() -> impl Strategy<Value = (SourceName, Vec<String>, Option<bool>, Option<bool>)> {
    (
        arb_source(),
        prop::collection::vec("[a-z]{1,8}", 0..4),
        prop::option::of(any::<bool>()),
        prop::option::of(any::<bool>()),
    )
}

/// Records with unique concept IDs, numbered in generation order.
fn build_records(
    members: Vec<(SourceName, Vec<String>, Option<bool>, Option<bool>)>,
) -> Vec<IdentityRecord> {
    members
        .into_iter()
        .enumerate()
        .map(|(i, (src, aliases, pediatric, oncologic))| {
            let mut disease =
                Disease::new(format!("{}:{}", src.namespace_prefix(), i), format!("label {}", i))
                    .with_aliases(aliases);
            disease.pediatric_disease = pediatric;
            disease.oncologic_disease = oncologic;
            IdentityRecord::new(disease, src)
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_merge_ignores_input_order(members in prop::collection::vec(arb_member(), 1..8)) {
        let records = build_records(members);
        let mut reversed = records.clone();
        reversed.reverse();
        let mut rotated = records.clone();
        rotated.rotate_left(1);

        let expected = merge_records(records).unwrap();
        prop_assert_eq!(&merge_records(reversed).unwrap(), &expected);
        prop_assert_eq!(&merge_records(rotated).unwrap(), &expected);
    }

    #[test]
    fn prop_representative_has_lowest_order_key(members in prop::collection::vec(arb_member(), 1..8)) {
        let records = build_records(members);
        let best = records.iter().map(|r| r.order_key()).min().unwrap();
        let merged = merge_records(records.clone()).unwrap();

        prop_assert_eq!(&merged.concept_id, &best.1);
        prop_assert_eq!(merged.member_ids.len(), records.len() - 1);
        prop_assert!(!merged.member_ids.contains(&merged.concept_id));
    }

    #[test]
    fn prop_aliases_are_union(members in prop::collection::vec(arb_member(), 1..8)) {
        let records = build_records(members);
        let union: BTreeSet<String> = records
            .iter()
            .flat_map(|r| r.disease.aliases.iter().cloned())
            .collect();
        let merged = merge_records(records).unwrap();
        prop_assert_eq!(merged.aliases, union);
    }

    #[test]
    fn prop_scalars_come_from_first_defining_member(members in prop::collection::vec(arb_member(), 1..8)) {
        let mut records = build_records(members);
        let merged = merge_records(records.clone()).unwrap();
        records.sort_by_key(|r| r.order_key());

        let pediatric = records.iter().find_map(|r| r.disease.pediatric_disease);
        let oncologic = records.iter().find_map(|r| r.disease.oncologic_disease);
        prop_assert_eq!(merged.pediatric_disease, pediatric);
        prop_assert_eq!(merged.oncologic_disease, oncologic);
        prop_assert_eq!(&merged.label, &records[0].disease.label);
    }

    #[test]
    fn prop_groups_contain_driver(xrefs in prop::collection::btree_set("ncit:C[0-9]{1,5}", 0..6)) {
        let disease = Disease::new("mondo:0000001", "driver").with_xrefs(xrefs.clone());
        let group = ConceptGroup::from_record(&IdentityRecord::new(disease, SourceName::Mondo));

        prop_assert!(group.member_ids.contains("mondo:0000001"));
        prop_assert_eq!(group.member_ids.len(), xrefs.len() + 1);
    }

    #[test]
    fn prop_disjoint_groups_never_overlap(count in 1usize..10) {
        let groups: Vec<ConceptGroup> = (0..count)
            .map(|i| ConceptGroup {
                driver_id: format!("mondo:{}", i),
                member_ids: [format!("mondo:{}", i), format!("ncit:C{}", i)].into_iter().collect(),
            })
            .collect();
        prop_assert!(find_overlaps(&groups).is_empty());
    }
}

#[test]
fn test_fixture_driver_groups_share_no_members() {
    let groups: Vec<ConceptGroup> = neuroblastoma_records()
        .into_iter()
        .filter(|(src, _)| src.is_merge_driver())
        .map(|(src, disease)| ConceptGroup::from_record(&IdentityRecord::new(disease, src)))
        .collect();
    assert!(!groups.is_empty());
    assert!(find_overlaps(&groups).is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_rerun_is_byte_identical(
        xrefs in prop::collection::vec((arb_source(), 0usize..6), 0..10)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (first, second) = runtime.block_on(async {
            let store = memory_store().await;
            let mut driver = Disease::new("mondo:0000001", "driver");
            for (src, n) in &xrefs {
                let id = format!("{}:{}", src.namespace_prefix(), n);
                if *src != SourceName::Mondo {
                    store
                        .add_record(&Disease::new(id.clone(), format!("member {}", n)), *src)
                        .await
                        .unwrap();
                }
                driver.xrefs.insert(id);
            }
            store.add_record(&driver, SourceName::Mondo).await.unwrap();
            store.complete_write_transaction().await.unwrap();

            let mut snapshots = Vec::new();
            for _ in 0..2 {
                update_normalized(store.as_ref(), None).await.unwrap();
                let records: Vec<StoredRecord> = store
                    .all_records(RecordType::Merger)
                    .try_collect()
                    .await
                    .unwrap();
                let mut lines: Vec<String> =
                    records.iter().map(|r| serde_json::to_string(r).unwrap()).collect();
                lines.sort();
                snapshots.push(lines);
            }
            (snapshots[0].clone(), snapshots[1].clone())
        });

        prop_assert_eq!(first, second);
    }
}
