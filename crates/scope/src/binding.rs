//! The per-scope adapter binding
//!
//! A [`Binding`] turns cache-source calls into local state transitions:
//! every operation sets its category's in-flight flag on entry, clears it
//! on exit, and on success replaces the scope's snapshot with the one the
//! source returned, then publishes a refreshed [`ScopeState`].
//!
//! ## Context requirements
//!
//! Collection operations (`all`, `one`, `create`, `find`, `find_one`,
//! `all_action`, `all_facet`) require a resolved location chain and fail
//! with `ScopeUnresolved` before any source call otherwise. Item
//! operations take an explicit key; the scope layer resolves context-bound
//! keys before delegating here.
//!
//! ## Error policy
//!
//! Mutating operations re-throw the source error unchanged after the
//! in-flight flag is reset. Facet and finder reads are display-derived: a
//! failure is caught, logged, and settles to a terminal `Null`/empty
//! result instead of propagating, with the message recorded in
//! `ScopeState::last_error`.
//!
//! ## Unmount
//!
//! After the owning scope unmounts, completing operations discard their
//! results: no snapshot replacement, no flag write, no publish. Nothing
//! panics.

use crate::state::{BindingFlags, FacetResults, OpCategory, ScopeState};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;
use trellis_cache::{CacheSource, Snapshot, SnapshotStore};
use trellis_core::{hash_params, Error, Item, LocationChain, Params, Result, ScopeKey, Value};

/// Resolved containment context of one scope
#[derive(Clone, Debug, Default)]
pub struct ScopeContext {
    /// The item this scope is bound to, if it is an item scope
    pub key: Option<ScopeKey>,
    /// The location chain this scope resolved, if any
    pub locations: Option<LocationChain>,
}

/// Per-scope facade over a cache source
pub struct Binding {
    source: Arc<dyn CacheSource>,
    store: SnapshotStore,
    flags: BindingFlags,
    facets: Arc<FacetResults>,
    context: RwLock<ScopeContext>,
    mounted: Arc<AtomicBool>,
    publisher: Arc<watch::Sender<ScopeState>>,
}

impl Binding {
    /// Create a binding over a source with an initial context
    pub fn new(
        source: Arc<dyn CacheSource>,
        context: ScopeContext,
        facets: Arc<FacetResults>,
        mounted: Arc<AtomicBool>,
        publisher: Arc<watch::Sender<ScopeState>>,
    ) -> Self {
        let store = SnapshotStore::new(Snapshot::empty(source.key_types().to_vec()));
        let binding = Self {
            source,
            store,
            flags: BindingFlags::new(),
            facets,
            context: RwLock::new(context),
            mounted,
            publisher,
        };
        let locations = binding.context.read().locations.clone();
        binding.publish(|state| state.locations = locations);
        binding
    }

    /// The source this binding calls into
    pub fn source(&self) -> &Arc<dyn CacheSource> {
        &self.source
    }

    /// The current local snapshot
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    /// The facet result store this binding merges into
    pub fn facets(&self) -> &Arc<FacetResults> {
        &self.facets
    }

    /// Whether the owning scope is still mounted
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// The currently resolved location chain, if any
    pub fn locations(&self) -> Option<LocationChain> {
        self.context.read().locations.clone()
    }

    /// The currently bound item key, if any
    pub fn key(&self) -> Option<ScopeKey> {
        self.context.read().key.clone()
    }

    /// Re-resolve the location chain (driven by the scope tree)
    pub fn set_locations(&self, locations: Option<LocationChain>) {
        self.context.write().locations = locations.clone();
        self.publish(|state| state.locations = locations);
    }

    /// Re-bind the item key (driven by the scope tree)
    pub fn set_key(&self, key: Option<ScopeKey>) {
        self.context.write().key = key;
    }

    /// The resolved item key, or `ScopeUnresolved`
    pub fn required_key(&self, operation: &str) -> Result<ScopeKey> {
        self.key()
            .ok_or_else(|| Error::unresolved(operation, "no item key bound to this scope"))
    }

    fn required_locations(&self, operation: &str) -> Result<LocationChain> {
        self.locations()
            .ok_or_else(|| Error::unresolved(operation, "no location chain resolved for this scope"))
    }

    fn begin(&self, category: OpCategory) {
        if self.is_mounted() {
            self.flags.set(category, true);
            self.publish(|_| {});
        }
    }

    fn end(&self, category: OpCategory) {
        if self.is_mounted() {
            self.flags.set(category, false);
            self.publish(|_| {});
        }
    }

    fn commit(&self, snapshot: Snapshot) {
        if self.is_mounted() {
            self.store.replace(snapshot);
        }
    }

    fn publish<F: FnOnce(&mut ScopeState)>(&self, f: F) {
        if !self.is_mounted() {
            return;
        }
        self.publisher.send_modify(|state| {
            f(state);
            state.flags = self.flags.snapshot();
            state.facet_results = self.facets.snapshot();
        });
    }

    fn publish_item(&self, item: &Item) {
        let item = item.clone();
        self.publish(move |state| {
            if let Some(slot) = state.items.iter_mut().find(|i| i.key() == item.key()) {
                *slot = item.clone();
            }
            state.item = Some(item);
            state.last_error = None;
        });
    }

    // === Collection operations ===

    /// All items in this scope's location matching a query
    pub async fn all(&self, query: &Params) -> Result<Vec<Item>> {
        let loc = self.required_locations("all")?;
        self.begin(OpCategory::Loading);
        let result = self.source.all(query, &loc).await;
        self.end(OpCategory::Loading);
        let (snapshot, items) = result?;
        self.commit(snapshot);
        let published = items.clone();
        self.publish(move |state| {
            state.items = published;
            state.last_error = None;
        });
        Ok(items)
    }

    /// First item in this scope's location matching a query
    pub async fn one(&self, query: &Params) -> Result<Option<Item>> {
        let loc = self.required_locations("one")?;
        self.begin(OpCategory::Loading);
        let result = self.source.one(query, &loc).await;
        self.end(OpCategory::Loading);
        let (snapshot, item) = result?;
        self.commit(snapshot);
        let published = item.clone();
        self.publish(move |state| {
            state.item = published;
            state.last_error = None;
        });
        Ok(item)
    }

    /// Create an item in this scope's location
    ///
    /// Fails with `ScopeUnresolved` before issuing any call when no
    /// location chain is available.
    pub async fn create(&self, properties: &Value) -> Result<Item> {
        let loc = self.required_locations("create")?;
        self.begin(OpCategory::Creating);
        let result = self.source.create(properties, &loc).await;
        self.end(OpCategory::Creating);
        let (snapshot, item) = result?;
        self.commit(snapshot);
        let published = item.clone();
        self.publish(move |state| {
            state.items.push(published.clone());
            state.item = Some(published);
            state.last_error = None;
        });
        Ok(item)
    }

    /// Run a named action over this scope's collection
    pub async fn all_action(&self, name: &str, body: &Value) -> Result<Vec<Item>> {
        let loc = self.required_locations("allAction")?;
        self.begin(OpCategory::Updating);
        let result = self.source.all_action(name, body, &loc).await;
        self.end(OpCategory::Updating);
        let (snapshot, items) = result?;
        self.commit(snapshot);
        let published = items.clone();
        self.publish(move |state| {
            state.items = published;
            state.last_error = None;
        });
        Ok(items)
    }

    /// Run a named finder over this scope's collection
    ///
    /// The result is memoized under `(finder, parameter hash)`; results for
    /// distinct parameter sets coexist. Like facets, a failed finder
    /// degrades: it logs, records `last_error`, settles the entry to
    /// `Null`, and resolves to an empty collection.
    pub async fn find(&self, finder: &str, params: &Params) -> Result<Vec<Item>> {
        let loc = self.required_locations("find")?;
        let hash = hash_params(params)?;
        self.begin(OpCategory::Loading);
        let result = self.source.find(finder, params, &loc).await;
        self.end(OpCategory::Loading);
        match result {
            Ok((snapshot, items)) => {
                self.commit(snapshot);
                self.facets.merge(
                    finder,
                    &hash,
                    Value::Array(items.iter().map(|i| i.data().clone()).collect()),
                );
                let published = items.clone();
                self.publish(move |state| {
                    state.items = published;
                    state.last_error = None;
                });
                Ok(items)
            }
            Err(err) => {
                warn!(finder, error = %err, "finder fetch failed; settling to empty result");
                self.facets.merge(finder, &hash, Value::Null);
                let message = err.to_string();
                self.publish(move |state| state.last_error = Some(message));
                Ok(Vec::new())
            }
        }
    }

    /// First result of a named finder
    pub async fn find_one(&self, finder: &str, params: &Params) -> Result<Option<Item>> {
        let items = self.find(finder, params).await?;
        Ok(items.into_iter().next())
    }

    /// Compute a named facet over this scope's collection
    ///
    /// Degrades on failure: logs, records `last_error`, settles the
    /// `(name, hash)` entry to `Null`, and returns `Ok(None)`.
    pub async fn all_facet(&self, name: &str, params: &Params) -> Result<Option<Value>> {
        let loc = self.required_locations("allFacet")?;
        let hash = hash_params(params)?;
        self.begin(OpCategory::Loading);
        let result = self.source.all_facet(name, params, &loc).await;
        self.end(OpCategory::Loading);
        self.settle_facet(name, &hash, result)
    }

    // === Item operations ===

    /// Fetch one item by key
    pub async fn get(&self, key: &ScopeKey) -> Result<Option<Item>> {
        self.begin(OpCategory::Loading);
        let result = self.source.get(key).await;
        self.end(OpCategory::Loading);
        let (snapshot, item) = result?;
        self.commit(snapshot);
        let published = item.clone();
        self.publish(move |state| {
            state.item = published;
            state.last_error = None;
        });
        Ok(item)
    }

    /// Fetch one item by key without forcing a cache change
    pub async fn retrieve(&self, key: &ScopeKey) -> Result<Option<Item>> {
        self.begin(OpCategory::Loading);
        let result = self.source.retrieve(key).await;
        self.end(OpCategory::Loading);
        let (snapshot, item) = result?;
        if let Some(snapshot) = snapshot {
            self.commit(snapshot);
        }
        let published = item.clone();
        self.publish(move |state| {
            state.item = published;
            state.last_error = None;
        });
        Ok(item)
    }

    /// Remove one item by key
    pub async fn remove(&self, key: &ScopeKey) -> Result<()> {
        self.begin(OpCategory::Removing);
        let result = self.source.remove(key).await;
        self.end(OpCategory::Removing);
        let snapshot = result?;
        self.commit(snapshot);
        let removed = key.clone();
        self.publish(move |state| {
            state.items.retain(|i| i.key() != &removed);
            if state.item.as_ref().map(Item::key) == Some(&removed) {
                state.item = None;
            }
            state.last_error = None;
        });
        Ok(())
    }

    /// Update one item's properties
    pub async fn update(&self, key: &ScopeKey, properties: &Value) -> Result<Item> {
        self.begin(OpCategory::Updating);
        let result = self.source.update(key, properties).await;
        self.end(OpCategory::Updating);
        let (snapshot, item) = result?;
        self.commit(snapshot);
        self.publish_item(&item);
        Ok(item)
    }

    /// Run a named action against one item
    ///
    /// The body is free-form; it is forwarded to the source unmodified.
    pub async fn action(&self, key: &ScopeKey, name: &str, body: &Value) -> Result<Item> {
        self.begin(OpCategory::Updating);
        let result = self.source.action(key, name, body).await;
        self.end(OpCategory::Updating);
        let (snapshot, item) = result?;
        self.commit(snapshot);
        self.publish_item(&item);
        Ok(item)
    }

    /// Write an item into the cache as-is
    pub async fn set(&self, key: &ScopeKey, item: Item) -> Result<Item> {
        self.begin(OpCategory::Updating);
        let result = self.source.set(key, item).await;
        self.end(OpCategory::Updating);
        let (snapshot, item) = result?;
        self.commit(snapshot);
        self.publish_item(&item);
        Ok(item)
    }

    /// Compute a named facet of one item
    ///
    /// Degrades on failure: logs, records `last_error`, settles the
    /// `(name, hash)` entry to `Null`, and returns `Ok(None)`.
    pub async fn facet(
        &self,
        key: &ScopeKey,
        name: &str,
        params: &Params,
    ) -> Result<Option<Value>> {
        let hash = hash_params(params)?;
        self.begin(OpCategory::Loading);
        let result = self.source.facet(key, name, params).await;
        self.end(OpCategory::Loading);
        self.settle_facet(name, &hash, result)
    }

    // Facet reads degrade instead of propagating: a transient facet
    // failure must not break primary CRUD flows. The entry settles to
    // Null (terminal, not in-flight) and the message lands in last_error.
    fn settle_facet(
        &self,
        name: &str,
        hash: &str,
        result: Result<(Snapshot, Value)>,
    ) -> Result<Option<Value>> {
        match result {
            Ok((snapshot, value)) => {
                self.commit(snapshot);
                self.facets.merge(name, hash, value.clone());
                self.publish(|state| state.last_error = None);
                Ok(Some(value))
            }
            Err(err) => {
                warn!(facet = name, error = %err, "facet fetch failed; settling to null result");
                self.facets.merge(name, hash, Value::Null);
                let message = err.to_string();
                self.publish(move |state| state.last_error = Some(message));
                Ok(None)
            }
        }
    }
}
