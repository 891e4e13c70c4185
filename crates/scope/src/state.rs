//! Per-scope binding state
//!
//! This module defines the state a scope owns exclusively:
//! - BindingFlags / BindingState: independent in-flight flags per
//!   operation category
//! - FacetResults: additive memoization store for facet and finder
//!   results, keyed by `(name, parameter hash)`
//! - ScopeState: the read-only surface a scope publishes to its
//!   descendants
//!
//! Flags are independent by design: loading one query while updating
//! another item keeps both categories true at once. They are NOT a single
//! combined state machine.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use trellis_core::{Item, LocationChain, Value};

/// Operation category an in-flight flag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCategory {
    /// Reads, finds, and facets
    Loading,
    /// Item creation
    Creating,
    /// Updates, actions, and sets
    Updating,
    /// Item removal
    Removing,
}

/// Independent in-flight flags, one per operation category
#[derive(Debug, Default)]
pub struct BindingFlags {
    loading: AtomicBool,
    creating: AtomicBool,
    updating: AtomicBool,
    removing: AtomicBool,
}

impl BindingFlags {
    /// All flags off
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one category's flag
    pub fn set(&self, category: OpCategory, on: bool) {
        let flag = match category {
            OpCategory::Loading => &self.loading,
            OpCategory::Creating => &self.creating,
            OpCategory::Updating => &self.updating,
            OpCategory::Removing => &self.removing,
        };
        flag.store(on, Ordering::SeqCst);
    }

    /// Read one category's flag
    pub fn get(&self, category: OpCategory) -> bool {
        match category {
            OpCategory::Loading => self.loading.load(Ordering::SeqCst),
            OpCategory::Creating => self.creating.load(Ordering::SeqCst),
            OpCategory::Updating => self.updating.load(Ordering::SeqCst),
            OpCategory::Removing => self.removing.load(Ordering::SeqCst),
        }
    }

    /// Point-in-time copy of all four flags
    pub fn snapshot(&self) -> BindingState {
        BindingState {
            is_loading: self.loading.load(Ordering::SeqCst),
            is_creating: self.creating.load(Ordering::SeqCst),
            is_updating: self.updating.load(Ordering::SeqCst),
            is_removing: self.removing.load(Ordering::SeqCst),
        }
    }
}

/// Published copy of the in-flight flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingState {
    /// A read, find, or facet is in flight
    pub is_loading: bool,
    /// A create is in flight
    pub is_creating: bool,
    /// An update, action, or set is in flight
    pub is_updating: bool,
    /// A remove is in flight
    pub is_removing: bool,
}

/// Additive memoization store for facet and finder results
///
/// Maps facet/finder name to a map from parameter hash to result payload.
/// Inserting a result for `(name, hash)` never drops entries for other
/// `(name, hash)` pairs: distinct argument sets coexist.
#[derive(Debug, Default)]
pub struct FacetResults {
    inner: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl FacetResults {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one result in, additively
    pub fn merge(&self, name: &str, hash: &str, value: Value) {
        self.inner
            .write()
            .entry(name.to_string())
            .or_default()
            .insert(hash.to_string(), value);
    }

    /// Look up one result
    pub fn get(&self, name: &str, hash: &str) -> Option<Value> {
        self.inner.read().get(name).and_then(|m| m.get(hash)).cloned()
    }

    /// Number of distinct `(name, hash)` entries
    pub fn len(&self) -> usize {
        self.inner.read().values().map(BTreeMap::len).sum()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Deep copy for publishing
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.inner.read().clone()
    }
}

/// The read-only surface a scope publishes to its descendants
///
/// Refreshed on every successful operation of the owning scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeState {
    /// Collection view from the latest collection operation
    pub items: Vec<Item>,
    /// Single-item view from the latest item operation
    pub item: Option<Item>,
    /// The location chain this scope resolved, if any
    pub locations: Option<LocationChain>,
    /// In-flight flags
    pub flags: BindingState,
    /// Facet and finder results, name -> parameter hash -> payload
    pub facet_results: BTreeMap<String, BTreeMap<String, Value>>,
    /// Most recent degraded-read failure, if any
    pub last_error: Option<String>,
}
