//! Immutable point-in-time views of the cache
//!
//! A [`Snapshot`] maps scope keys to items for a declared set of key types.
//! Snapshots are produced by a cache source after every call and never
//! mutated in place: builders return a NEW snapshot with a fresh identity.
//! Structural sharing is permitted (the item map lives behind an `Arc`),
//! but identity always changes so downstream observers recompute.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use trellis_core::{Item, KeyType, LocationChain, ScopeKey};
use uuid::Uuid;

/// Unique identity of one snapshot instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable mapping from scope key to item
///
/// Produced by the cache source on every call; ownership transfers to the
/// snapshot store, which discards the prior snapshot. Two snapshots with
/// equal contents are still distinct ([`Snapshot::same_identity`] is the
/// identity check that drives downstream recomputation).
#[derive(Debug, Clone)]
pub struct Snapshot {
    id: SnapshotId,
    key_types: Vec<KeyType>,
    items: Arc<BTreeMap<ScopeKey, Item>>,
}

impl Snapshot {
    /// Create a snapshot over the given items
    pub fn new(key_types: Vec<KeyType>, items: BTreeMap<ScopeKey, Item>) -> Self {
        Self {
            id: SnapshotId::new(),
            key_types,
            items: Arc::new(items),
        }
    }

    /// Create an empty snapshot
    pub fn empty(key_types: Vec<KeyType>) -> Self {
        Self::new(key_types, BTreeMap::new())
    }

    /// This snapshot's identity
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// The key types this snapshot was constructed for
    pub fn key_types(&self) -> &[KeyType] {
        &self.key_types
    }

    /// Whether two snapshots are the same instance
    pub fn same_identity(&self, other: &Snapshot) -> bool {
        self.id == other.id
    }

    /// Look up an item by key
    pub fn get(&self, key: &ScopeKey) -> Option<&Item> {
        self.items.get(key)
    }

    /// Whether the snapshot holds an item for this key
    pub fn contains(&self, key: &ScopeKey) -> bool {
        self.items.contains_key(key)
    }

    /// All items whose location chain matches `loc`
    ///
    /// Primary-keyed items match the empty chain.
    pub fn items_in(&self, loc: &LocationChain) -> Vec<Item> {
        self.items
            .values()
            .filter(|item| match item.key().location() {
                Some(chain) => chain == loc,
                None => loc.is_empty(),
            })
            .cloned()
            .collect()
    }

    /// Iterate over all items
    pub fn iter(&self) -> impl Iterator<Item = (&ScopeKey, &Item)> {
        self.items.iter()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// New snapshot with this item inserted (fresh identity)
    pub fn with_item(&self, item: Item) -> Self {
        let mut items = (*self.items).clone();
        items.insert(item.key().clone(), item);
        Self::new(self.key_types.clone(), items)
    }

    /// New snapshot with this key removed (fresh identity)
    pub fn without_item(&self, key: &ScopeKey) -> Self {
        let mut items = (*self.items).clone();
        items.remove(key);
        Self::new(self.key_types.clone(), items)
    }

    /// New empty snapshot with the same key types (fresh identity)
    pub fn cleared(&self) -> Self {
        Self::empty(self.key_types.clone())
    }

    /// Deep-copy the item map into a fresh allocation, keeping identity
    ///
    /// Used by the snapshot store at its clone-on-write boundary: the copy
    /// shares no structure with the snapshot handed in, so later mutation
    /// inside the producing source cannot alias a published snapshot.
    pub fn detached(&self) -> Self {
        Self {
            id: self.id,
            key_types: self.key_types.clone(),
            items: Arc::new((*self.items).clone()),
        }
    }
}
