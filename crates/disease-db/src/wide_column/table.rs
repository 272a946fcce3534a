//! Single-table item storage with a composite key and two secondary indexes.
//!
//! Items are keyed by `(label_and_type, concept_id)`. The partition part is
//! `"<lower-cased term>##<item_type>"`, so every reference lookup is a
//! range query over one partition.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use disease_core::{IdentityRecord, MergedRecord, RecordType, RefType, SourceMeta, SourceName};

/// Kind of item held in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Identity,
    Merger,
    Label,
    Alias,
    Xref,
    AssociatedWith,
    Source,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Identity => "identity",
            ItemType::Merger => "merger",
            ItemType::Label => "label",
            ItemType::Alias => "alias",
            ItemType::Xref => "xref",
            ItemType::AssociatedWith => "associated_with",
            ItemType::Source => "source",
        }
    }
}

impl From<RefType> for ItemType {
    fn from(ref_type: RefType) -> Self {
        match ref_type {
            RefType::Label => ItemType::Label,
            RefType::Alias => ItemType::Alias,
            RefType::Xref => ItemType::Xref,
            RefType::AssociatedWith => ItemType::AssociatedWith,
        }
    }
}

impl From<RecordType> for ItemType {
    fn from(record_type: RecordType) -> Self {
        match record_type {
            RecordType::Identity => ItemType::Identity,
            RecordType::Merger => ItemType::Merger,
        }
    }
}

/// Composite primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub label_and_type: String,
    pub concept_id: String,
}

impl ItemKey {
    pub fn new(term: &str, item_type: ItemType, concept_id: impl Into<String>) -> Self {
        Self {
            label_and_type: partition_key(term, item_type),
            concept_id: concept_id.into(),
        }
    }

    pub fn identity(concept_id: &str) -> Self {
        Self::new(concept_id, ItemType::Identity, concept_id)
    }

    pub fn merger(concept_id: &str) -> Self {
        Self::new(concept_id, ItemType::Merger, concept_id)
    }

    pub fn source(src: SourceName) -> Self {
        let lower = src.as_str().to_lowercase();
        Self {
            label_and_type: partition_key(&lower, ItemType::Source),
            concept_id: format!("source:{}", lower),
        }
    }
}

/// Partition key for a term and item type.
pub fn partition_key(term: &str, item_type: ItemType) -> String {
    format!("{}##{}", term.to_lowercase(), item_type.as_str())
}

/// Stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemBody {
    Identity(IdentityRecord),
    Merger(MergedRecord),
    Reference,
    Source(SourceMeta),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub item_type: ItemType,
    /// Present on every item owned by a source: identity, reference, and
    /// source-metadata items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_name: Option<SourceName>,
    pub body: ItemBody,
}

impl Item {
    fn identity(record: IdentityRecord) -> Self {
        Self {
            key: ItemKey::identity(record.concept_id()),
            item_type: ItemType::Identity,
            src_name: Some(record.src_name),
            body: ItemBody::Identity(record),
        }
    }

    fn reference(term: &str, ref_type: RefType, concept_id: &str, src: SourceName) -> Self {
        let item_type = ItemType::from(ref_type);
        Self {
            key: ItemKey::new(term, item_type, concept_id),
            item_type,
            src_name: Some(src),
            body: ItemBody::Reference,
        }
    }
}

/// Reference items derived from an identity record.
fn reference_items(record: &IdentityRecord) -> Vec<Item> {
    record
        .disease
        .reference_terms()
        .into_iter()
        .map(|(ref_type, term)| Item::reference(term, ref_type, record.concept_id(), record.src_name))
        .collect()
}

/// One page of a scan.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Key to resume from; `None` once the table is exhausted.
    pub last_evaluated_key: Option<ItemKey>,
}

/// The table and its secondary indexes.
#[derive(Debug, Default, Clone)]
pub struct Table {
    items: BTreeMap<ItemKey, Item>,
    src_index: HashMap<SourceName, BTreeSet<ItemKey>>,
    item_type_index: HashMap<ItemType, BTreeSet<ItemKey>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table and its indexes from persisted items.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut table = Self::new();
        for item in items {
            table.put(item);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn get(&self, key: &ItemKey) -> Option<&Item> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &ItemKey) -> Option<&mut Item> {
        self.items.get_mut(key)
    }

    /// Insert or overwrite an item, keeping both indexes current.
    pub fn put(&mut self, item: Item) {
        let key = item.key.clone();
        self.unindex(&key);
        if let Some(src) = item.src_name {
            self.src_index.entry(src).or_default().insert(key.clone());
        }
        self.item_type_index
            .entry(item.item_type)
            .or_default()
            .insert(key.clone());
        self.items.insert(key, item);
    }

    pub fn delete(&mut self, key: &ItemKey) -> Option<Item> {
        self.unindex(key);
        self.items.remove(key)
    }

    fn unindex(&mut self, key: &ItemKey) {
        if let Some(old) = self.items.get(key) {
            if let Some(src) = old.src_name {
                if let Some(keys) = self.src_index.get_mut(&src) {
                    keys.remove(key);
                }
            }
            if let Some(keys) = self.item_type_index.get_mut(&old.item_type) {
                keys.remove(key);
            }
        }
    }

    /// Write an identity record and its reference items, retiring the
    /// reference items of any record it replaces.
    pub fn put_identity(&mut self, record: IdentityRecord) {
        let key = ItemKey::identity(record.concept_id());
        if let Some(Item {
            body: ItemBody::Identity(old),
            ..
        }) = self.items.get(&key).cloned()
        {
            for stale in reference_items(&old) {
                self.delete(&stale.key);
            }
        }
        for reference in reference_items(&record) {
            self.put(reference);
        }
        self.put(Item::identity(record));
    }

    pub fn put_merged(&mut self, record: MergedRecord) {
        let key = ItemKey::merger(&record.concept_id);
        self.put(Item {
            key,
            item_type: ItemType::Merger,
            src_name: None,
            body: ItemBody::Merger(record),
        });
    }

    pub fn put_source(&mut self, src: SourceName, meta: SourceMeta) {
        self.put(Item {
            key: ItemKey::source(src),
            item_type: ItemType::Source,
            src_name: Some(src),
            body: ItemBody::Source(meta),
        });
    }

    /// All items in one partition, ordered by sort key.
    pub fn query_partition(&self, label_and_type: &str) -> impl Iterator<Item = &Item> {
        let start = ItemKey {
            label_and_type: label_and_type.to_string(),
            concept_id: String::new(),
        };
        let pk = label_and_type.to_string();
        self.items
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(move |(k, _)| k.label_and_type == pk)
            .map(|(_, item)| item)
    }

    /// Keys of every item owned by a source.
    pub fn query_src_index(&self, src: SourceName) -> Vec<ItemKey> {
        self.src_index
            .get(&src)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys of every item of a type.
    pub fn query_item_type_index(&self, item_type: ItemType) -> Vec<ItemKey> {
        self.item_type_index
            .get(&item_type)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_item_type(&self, item_type: ItemType) -> usize {
        self.item_type_index
            .get(&item_type)
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    /// Up to `limit` items following `exclusive_start_key` in key order.
    pub fn scan(&self, exclusive_start_key: Option<&ItemKey>, limit: usize) -> ScanPage {
        let lower = match exclusive_start_key {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        let mut range = self.items.range((lower, Bound::Unbounded));
        let items: Vec<Item> = range
            .by_ref()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect();
        let last_evaluated_key = match (items.last(), range.next()) {
            (Some(last), Some(_)) => Some(last.key.clone()),
            _ => None,
        };
        ScanPage {
            items,
            last_evaluated_key,
        }
    }
}
