//! In-memory reference cache source
//!
//! `MemorySource` is the embedded reference implementation of the
//! [`CacheSource`] contract: a thread-safe item map that produces a fresh
//! snapshot on every call and emits change events over a broadcast channel.
//! It is the source every test layer binds against; the authoritative
//! storage engine behind a production source is out of scope here.
//!
//! Finder, facet, and action semantics are host-defined, so they are
//! registered as closures at construction time. An unregistered name is a
//! source-operation error, never a silent empty result.

use crate::snapshot::Snapshot;
use crate::source::CacheSource;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use trellis_core::{
    ChangeEvent, Error, EventKind, Item, KeyType, KeyValue, LocationChain, Params, Result,
    ScopeKey, Value,
};

/// Finder handler: params + candidate items in scope to result items
pub type FinderFn = Arc<dyn Fn(&Params, &[Item]) -> Vec<Item> + Send + Sync>;
/// Single-item facet handler
pub type FacetFn = Arc<dyn Fn(&Item, &Params) -> Value + Send + Sync>;
/// Collection facet handler
pub type AllFacetFn = Arc<dyn Fn(&[Item], &Params) -> Value + Send + Sync>;
/// Single-item action handler: item + body to updated item
pub type ActionFn = Arc<dyn Fn(&Item, &Value) -> Result<Item> + Send + Sync>;
/// Collection action handler: items in scope + body to updated items
pub type AllActionFn = Arc<dyn Fn(&[Item], &Value) -> Result<Vec<Item>> + Send + Sync>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Thread-safe in-memory cache source
pub struct MemorySource {
    key_types: Vec<KeyType>,
    items: RwLock<BTreeMap<ScopeKey, Item>>,
    finders: DashMap<String, FinderFn>,
    facets: DashMap<String, FacetFn>,
    all_facets: DashMap<String, AllFacetFn>,
    actions: DashMap<String, ActionFn>,
    all_actions: DashMap<String, AllActionFn>,
    events_tx: broadcast::Sender<ChangeEvent>,
}

impl MemorySource {
    /// Create an empty source serving the given key-type chain
    pub fn new(key_types: Vec<KeyType>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            key_types,
            items: RwLock::new(BTreeMap::new()),
            finders: DashMap::new(),
            facets: DashMap::new(),
            all_facets: DashMap::new(),
            actions: DashMap::new(),
            all_actions: DashMap::new(),
            events_tx,
        }
    }

    /// Register a finder handler
    pub fn with_finder(
        self,
        name: impl Into<String>,
        f: impl Fn(&Params, &[Item]) -> Vec<Item> + Send + Sync + 'static,
    ) -> Self {
        self.finders.insert(name.into(), Arc::new(f));
        self
    }

    /// Register a single-item facet handler
    pub fn with_facet(
        self,
        name: impl Into<String>,
        f: impl Fn(&Item, &Params) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.facets.insert(name.into(), Arc::new(f));
        self
    }

    /// Register a collection facet handler
    pub fn with_all_facet(
        self,
        name: impl Into<String>,
        f: impl Fn(&[Item], &Params) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.all_facets.insert(name.into(), Arc::new(f));
        self
    }

    /// Register a single-item action handler
    pub fn with_action(
        self,
        name: impl Into<String>,
        f: impl Fn(&Item, &Value) -> Result<Item> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }

    /// Register a collection action handler
    pub fn with_all_action(
        self,
        name: impl Into<String>,
        f: impl Fn(&[Item], &Value) -> Result<Vec<Item>> + Send + Sync + 'static,
    ) -> Self {
        self.all_actions.insert(name.into(), Arc::new(f));
        self
    }

    /// Insert items directly, without emitting events
    ///
    /// Seeding helper for tests and bootstrap.
    pub fn seed(&self, items: impl IntoIterator<Item = Item>) {
        let mut map = self.items.write();
        for item in items {
            map.insert(item.key().clone(), item);
        }
    }

    /// Drop every item and emit `CacheCleared`
    pub fn clear(&self) {
        let dropped = {
            let mut map = self.items.write();
            let dropped = map.len();
            map.clear();
            dropped
        };
        debug!(dropped, "memory source cleared");
        self.emit(EventKind::CacheCleared, None);
    }

    fn snapshot_now(&self) -> Snapshot {
        Snapshot::new(self.key_types.clone(), self.items.read().clone())
    }

    fn emit(&self, kind: EventKind, key: Option<ScopeKey>) {
        // nobody listening is fine
        let _ = self.events_tx.send(ChangeEvent::new(kind, key));
    }

    fn in_chain(key: &ScopeKey, loc: &LocationChain) -> bool {
        match key.location() {
            Some(chain) => chain == loc,
            None => loc.is_empty(),
        }
    }

    fn items_under(&self, loc: &LocationChain) -> Vec<Item> {
        self.items
            .read()
            .values()
            .filter(|item| Self::in_chain(item.key(), loc))
            .cloned()
            .collect()
    }

    // Null-valued query entries are wildcards, mirroring their omission
    // from parameter hashing.
    fn matches_query(item: &Item, query: &Params) -> bool {
        query
            .iter()
            .all(|(k, v)| v.is_null() || item.data().get(k) == Some(v))
    }

    fn merge_properties(existing: &Value, properties: &Value) -> Value {
        match (existing, properties) {
            (Value::Object(base), Value::Object(patch)) => {
                let mut merged = base.clone();
                for (k, v) in patch {
                    merged.insert(k.clone(), v.clone());
                }
                Value::Object(merged)
            }
            _ => properties.clone(),
        }
    }
}

#[async_trait]
impl CacheSource for MemorySource {
    fn key_types(&self) -> &[KeyType] {
        &self.key_types
    }

    async fn all(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Vec<Item>)> {
        let items: Vec<Item> = self
            .items_under(loc)
            .into_iter()
            .filter(|item| Self::matches_query(item, query))
            .collect();
        Ok((self.snapshot_now(), items))
    }

    async fn one(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Option<Item>)> {
        let (snapshot, items) = self.all(query, loc).await?;
        Ok((snapshot, items.into_iter().next()))
    }

    async fn create(&self, properties: &Value, loc: &LocationChain) -> Result<(Snapshot, Item)> {
        let kt = self.key_types[0].clone();
        let key = if loc.is_empty() {
            ScopeKey::primary(kt, KeyValue::random())
        } else {
            ScopeKey::composite(kt, KeyValue::random(), loc.clone())
        };
        let item = Item::new(key.clone(), properties.clone());
        self.items.write().insert(key.clone(), item.clone());
        self.emit(EventKind::ItemCreated, Some(key));
        Ok((self.snapshot_now(), item))
    }

    async fn get(&self, key: &ScopeKey) -> Result<(Snapshot, Option<Item>)> {
        key.matches_types(&self.key_types)?;
        let item = self.items.read().get(key).cloned();
        Ok((self.snapshot_now(), item))
    }

    async fn remove(&self, key: &ScopeKey) -> Result<Snapshot> {
        let removed = self.items.write().remove(key);
        if removed.is_none() {
            return Err(Error::source("remove", format!("item not found: {}", key.abbrev())));
        }
        self.emit(EventKind::ItemRemoved, Some(key.clone()));
        Ok(self.snapshot_now())
    }

    async fn retrieve(&self, key: &ScopeKey) -> Result<(Option<Snapshot>, Option<Item>)> {
        // everything is already local: the cache view never changes here
        let item = self.items.read().get(key).cloned();
        Ok((None, item))
    }

    async fn update(&self, key: &ScopeKey, properties: &Value) -> Result<(Snapshot, Item)> {
        let updated = {
            let mut map = self.items.write();
            let existing = map
                .get(key)
                .ok_or_else(|| Error::source("update", format!("item not found: {}", key.abbrev())))?;
            let updated = existing.with_data(Self::merge_properties(existing.data(), properties));
            map.insert(key.clone(), updated.clone());
            updated
        };
        self.emit(EventKind::ItemUpdated, Some(key.clone()));
        Ok((self.snapshot_now(), updated))
    }

    async fn action(&self, key: &ScopeKey, name: &str, body: &Value) -> Result<(Snapshot, Item)> {
        let handler = self
            .actions
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::source("action", format!("unknown action '{name}'")))?;
        let current = self
            .items
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::source("action", format!("item not found: {}", key.abbrev())))?;
        let updated = handler(&current, body)?;
        self.items
            .write()
            .insert(updated.key().clone(), updated.clone());
        self.emit(EventKind::ItemUpdated, Some(updated.key().clone()));
        Ok((self.snapshot_now(), updated))
    }

    async fn all_action(
        &self,
        name: &str,
        body: &Value,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)> {
        let handler = self
            .all_actions
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::source("allAction", format!("unknown action '{name}'")))?;
        let candidates = self.items_under(loc);
        let updated = handler(&candidates, body)?;
        {
            let mut map = self.items.write();
            for item in &updated {
                map.insert(item.key().clone(), item.clone());
            }
        }
        for item in &updated {
            self.emit(EventKind::ItemUpdated, Some(item.key().clone()));
        }
        Ok((self.snapshot_now(), updated))
    }

    async fn find(
        &self,
        finder: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)> {
        let handler = self
            .finders
            .get(finder)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::source("find", format!("unknown finder '{finder}'")))?;
        let candidates = self.items_under(loc);
        let found = handler(params, &candidates);
        Ok((self.snapshot_now(), found))
    }

    async fn set(&self, key: &ScopeKey, item: Item) -> Result<(Snapshot, Item)> {
        if key != item.key() {
            return Err(Error::source(
                "set",
                format!("key mismatch: {} vs {}", key.abbrev(), item.key().abbrev()),
            ));
        }
        self.items.write().insert(key.clone(), item.clone());
        self.emit(EventKind::ItemUpdated, Some(key.clone()));
        Ok((self.snapshot_now(), item))
    }

    async fn facet(
        &self,
        key: &ScopeKey,
        name: &str,
        params: &Params,
    ) -> Result<(Snapshot, Value)> {
        let handler = self
            .facets
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::source("facet", format!("unknown facet '{name}'")))?;
        let item = self
            .items
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::source("facet", format!("item not found: {}", key.abbrev())))?;
        Ok((self.snapshot_now(), handler(&item, params)))
    }

    async fn all_facet(
        &self,
        name: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Value)> {
        let handler = self
            .all_facets
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::source("allFacet", format!("unknown facet '{name}'")))?;
        let candidates = self.items_under(loc);
        Ok((self.snapshot_now(), handler(&candidates, params)))
    }

    fn events(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        Some(self.events_tx.subscribe())
    }
}
