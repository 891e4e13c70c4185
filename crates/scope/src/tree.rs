//! Scope tree composition
//!
//! Scopes nest: a descendant's queries are automatically constrained by
//! its nearest ancestor's resolved location. The tree is an explicit
//! observer graph of publish/subscribe nodes: each [`ScopeNode`] owns a
//! `watch` state cell holding its published [`ScopeState`], children hold
//! a receiver on their parent's cell and re-resolve their location chain
//! whenever the parent publishes.
//!
//! Facet-producing scopes of the same kind share one result store:
//! attachment is resolved once per mount into an explicit two-variant
//! result ([`Attachment`]), so a nested scope merges into its ancestor's
//! store instead of replacing it.

use crate::binding::{Binding, ScopeContext};
use crate::invalidation::{self, InvalidationOptions, RefetchFn, Subscription};
use crate::state::{FacetResults, ScopeState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use trellis_cache::{build_source, AggregateConfig, CacheSource};
use trellis_core::{
    Item, KeyType, LocKey, LocationChain, Params, Result, ScopeKey, Value,
};

/// One publish/subscribe node in the scope tree
pub struct ScopeNode {
    kind: KeyType,
    facets: Arc<FacetResults>,
    publisher: Arc<watch::Sender<ScopeState>>,
    parent: Option<Arc<ScopeNode>>,
}

impl ScopeNode {
    /// The kind (item key type) this node serves
    pub fn kind(&self) -> &KeyType {
        &self.kind
    }

    /// Subscribe to this node's published state
    pub fn subscribe(&self) -> watch::Receiver<ScopeState> {
        self.publisher.subscribe()
    }

    /// The node's currently published state
    pub fn state(&self) -> ScopeState {
        self.publisher.borrow().clone()
    }

    fn nearest_of_kind(self: &Arc<Self>, kind: &KeyType) -> Option<Arc<ScopeNode>> {
        let mut node = Some(self.clone());
        while let Some(current) = node {
            if &current.kind == kind {
                return Some(current);
            }
            node = current.parent.clone();
        }
        None
    }
}

/// How a mounting scope relates to existing same-kind ancestors
///
/// Resolved once per mount: `Attached` merges facet results into the
/// ancestor's store (additive, never replacing its existing entries);
/// `Detached` seeds a fresh store with the scope's own results.
pub enum Attachment {
    /// An ancestor scope of the same kind exists; share its store
    Attached(Arc<FacetResults>),
    /// No same-kind ancestor; start a fresh store
    Detached(Arc<FacetResults>),
}

impl Attachment {
    /// Resolve against the nearest same-kind ancestor, if any
    pub fn resolve(parent: Option<&Arc<ScopeNode>>, kind: &KeyType) -> Self {
        match parent.and_then(|p| p.nearest_of_kind(kind)) {
            Some(ancestor) => Attachment::Attached(ancestor.facets.clone()),
            None => Attachment::Detached(Arc::new(FacetResults::new())),
        }
    }

    /// The facet store this attachment resolved to
    pub fn facets(&self) -> &Arc<FacetResults> {
        match self {
            Attachment::Attached(facets) | Attachment::Detached(facets) => facets,
        }
    }

    /// Whether an ancestor store was joined
    pub fn is_attached(&self) -> bool {
        matches!(self, Attachment::Attached(_))
    }
}

/// Derive the location chain a child scope inherits from a parent's
/// published item
///
/// The parent's item becomes the nearest ancestor, prepended to the
/// parent item's own chain. `None` until the parent has published an item.
pub fn inherited_chain(parent_state: &ScopeState) -> Option<LocationChain> {
    parent_state.item.as_ref().map(|item| {
        let key = item.key();
        let nearest = LocKey::new(key.key_type().clone(), key.value().clone());
        match key.location() {
            Some(chain) => chain.nested_under(nearest),
            None => LocationChain::new(vec![nearest]),
        }
    })
}

/// Configuration for mounting one scope
pub struct ScopeConfig {
    source: Arc<dyn CacheSource>,
    kind: KeyType,
    aggregates: Option<AggregateConfig>,
    invalidation: Option<(InvalidationOptions, RefetchFn)>,
    item: Option<ScopeKey>,
    locations: Option<LocationChain>,
}

impl ScopeConfig {
    /// A scope over a source, serving one item kind
    pub fn new(source: Arc<dyn CacheSource>, kind: impl Into<KeyType>) -> Self {
        Self {
            source,
            kind: kind.into(),
            aggregates: None,
            invalidation: None,
            item: None,
            locations: None,
        }
    }

    /// Augment reads with named aggregate sub-fetches
    pub fn with_aggregates(mut self, config: AggregateConfig) -> Self {
        self.aggregates = Some(config);
        self
    }

    /// Keep a derived query fresh via debounced invalidation
    pub fn with_invalidation(mut self, options: InvalidationOptions, refetch: RefetchFn) -> Self {
        self.invalidation = Some((options, refetch));
        self
    }

    /// Bind the scope to one item
    pub fn with_item(mut self, key: ScopeKey) -> Self {
        self.item = Some(key);
        self
    }

    /// Pin the scope to an explicit location chain
    ///
    /// Overrides parent inheritance; the chain never re-resolves.
    pub fn with_locations(mut self, locations: LocationChain) -> Self {
        self.locations = Some(locations);
        self
    }
}

/// One mounted scope: a binding plus its place in the tree
pub struct Scope {
    node: Arc<ScopeNode>,
    binding: Arc<Binding>,
    mounted: Arc<AtomicBool>,
    subscription: Mutex<Option<Subscription>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scope {
    /// Mount a scope, optionally nested under a parent node
    ///
    /// Resolves the effective location chain from the nearest ancestor's
    /// published item (unless pinned), resolves facet-store attachment
    /// once, selects the aggregating decorator once, and registers the
    /// invalidation subscription. Must be called within a tokio runtime.
    pub fn mount(parent: Option<&Arc<ScopeNode>>, config: ScopeConfig) -> Scope {
        let source = build_source(config.source, config.aggregates);
        let attachment = Attachment::resolve(parent, &config.kind);
        let facets = attachment.facets().clone();
        let publisher = Arc::new(watch::channel(ScopeState::default()).0);
        let node = Arc::new(ScopeNode {
            kind: config.kind,
            facets: facets.clone(),
            publisher: publisher.clone(),
            parent: parent.cloned(),
        });
        let mounted = Arc::new(AtomicBool::new(true));

        let pinned = config.locations.is_some();
        let locations = config
            .locations
            .or_else(|| parent.and_then(|p| inherited_chain(&p.state())));
        let binding = Arc::new(Binding::new(
            source,
            ScopeContext {
                key: config.item,
                locations,
            },
            facets,
            mounted.clone(),
            publisher,
        ));

        // a pinned chain never re-resolves; otherwise follow the parent
        let watcher = match parent {
            Some(parent) if !pinned => {
                let mut rx = parent.subscribe();
                let binding = binding.clone();
                let mounted = mounted.clone();
                Some(tokio::spawn(async move {
                    while rx.changed().await.is_ok() {
                        if !mounted.load(Ordering::SeqCst) {
                            break;
                        }
                        let state = rx.borrow().clone();
                        binding.set_locations(inherited_chain(&state));
                    }
                }))
            }
            _ => None,
        };

        let subscription = config
            .invalidation
            .map(|(options, refetch)| invalidation::subscribe(binding.source().as_ref(), options, refetch));

        Scope {
            node,
            binding,
            mounted,
            subscription: Mutex::new(subscription),
            watcher: Mutex::new(watcher),
        }
    }

    /// This scope's tree node, for nesting children under it
    pub fn node(&self) -> &Arc<ScopeNode> {
        &self.node
    }

    /// Subscribe to this scope's published state
    pub fn subscribe(&self) -> watch::Receiver<ScopeState> {
        self.node.subscribe()
    }

    /// The currently published state
    pub fn state(&self) -> ScopeState {
        self.node.state()
    }

    /// The underlying binding
    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    /// Whether the scope is still mounted
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Bind this scope to one item key
    pub fn bind_item(&self, key: ScopeKey) {
        self.binding.set_key(Some(key));
    }

    /// Unmount: stop following the parent, release the invalidation
    /// subscription, and discard results of still-in-flight operations
    ///
    /// Idempotent; never panics.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }

    // === Collection operations (location-bound) ===

    /// All items in this scope's location matching a query
    pub async fn all(&self, query: &Params) -> Result<Vec<Item>> {
        self.binding.all(query).await
    }

    /// First item in this scope's location matching a query
    pub async fn one(&self, query: &Params) -> Result<Option<Item>> {
        self.binding.one(query).await
    }

    /// Create an item in this scope's location
    pub async fn create(&self, properties: &Value) -> Result<Item> {
        self.binding.create(properties).await
    }

    /// Run a named finder over this scope's collection
    pub async fn find(&self, finder: &str, params: &Params) -> Result<Vec<Item>> {
        self.binding.find(finder, params).await
    }

    /// First result of a named finder
    pub async fn find_one(&self, finder: &str, params: &Params) -> Result<Option<Item>> {
        self.binding.find_one(finder, params).await
    }

    /// Run a named action over this scope's collection
    pub async fn all_action(&self, name: &str, body: &Value) -> Result<Vec<Item>> {
        self.binding.all_action(name, body).await
    }

    /// Compute a named facet over this scope's collection
    pub async fn all_facet(&self, name: &str, params: &Params) -> Result<Option<Value>> {
        self.binding.all_facet(name, params).await
    }

    // === Item operations (key-bound) ===

    /// Fetch this scope's bound item
    pub async fn get(&self) -> Result<Option<Item>> {
        let key = self.binding.required_key("get")?;
        self.binding.get(&key).await
    }

    /// Fetch this scope's bound item without forcing a cache change
    pub async fn retrieve(&self) -> Result<Option<Item>> {
        let key = self.binding.required_key("retrieve")?;
        self.binding.retrieve(&key).await
    }

    /// Remove this scope's bound item
    pub async fn remove(&self) -> Result<()> {
        let key = self.binding.required_key("remove")?;
        self.binding.remove(&key).await
    }

    /// Update this scope's bound item
    pub async fn update(&self, properties: &Value) -> Result<Item> {
        let key = self.binding.required_key("update")?;
        self.binding.update(&key, properties).await
    }

    /// Run a named action against this scope's bound item
    pub async fn action(&self, name: &str, body: &Value) -> Result<Item> {
        let key = self.binding.required_key("action")?;
        self.binding.action(&key, name, body).await
    }

    /// Write an item into the cache as-is, keyed by the item itself
    pub async fn set(&self, item: Item) -> Result<Item> {
        let key = item.key().clone();
        self.binding.set(&key, item).await
    }

    /// Compute a named facet of this scope's bound item
    pub async fn facet(&self, name: &str, params: &Params) -> Result<Option<Value>> {
        let key = self.binding.required_key("facet")?;
        self.binding.facet(&key, name, params).await
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.unmount();
    }
}
