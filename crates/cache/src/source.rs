//! The cache-source contract
//!
//! A [`CacheSource`] is the external collaborator that owns authoritative
//! item data. Every operation returns a uniform two-part result: a fresh
//! [`Snapshot`] plus the operation's payload (`remove` returns just the
//! snapshot, `retrieve` may return no snapshot when nothing changed).
//!
//! Sources MAY expose a change-event stream via [`CacheSource::events`];
//! returning `None` means "no live invalidation" and is never an error.

use crate::snapshot::Snapshot;
use async_trait::async_trait;
use tokio::sync::broadcast;
use trellis_core::{ChangeEvent, Item, KeyType, LocationChain, Params, Result, ScopeKey, Value};

/// Asynchronous cache source
///
/// All calls are non-blocking suspension points; implementations must not
/// hold locks across their own await points. The source is shared across
/// every scope that references it and is the sole arbiter of item truth.
#[async_trait]
pub trait CacheSource: Send + Sync {
    /// The key types this source serves: the item type first, then ancestor
    /// container types nearest first
    fn key_types(&self) -> &[KeyType];

    /// All items under a location chain matching a query
    async fn all(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Vec<Item>)>;

    /// First item under a location chain matching a query
    async fn one(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Option<Item>)>;

    /// Create an item under a location chain
    async fn create(&self, properties: &Value, loc: &LocationChain) -> Result<(Snapshot, Item)>;

    /// Fetch one item by key
    async fn get(&self, key: &ScopeKey) -> Result<(Snapshot, Option<Item>)>;

    /// Remove one item by key
    async fn remove(&self, key: &ScopeKey) -> Result<Snapshot>;

    /// Fetch one item by key without forcing a cache change
    ///
    /// Returns `(None, item)` when the cache already held the item and
    /// nothing changed.
    async fn retrieve(&self, key: &ScopeKey) -> Result<(Option<Snapshot>, Option<Item>)>;

    /// Update one item's properties
    async fn update(&self, key: &ScopeKey, properties: &Value) -> Result<(Snapshot, Item)>;

    /// Run a named server-side action against one item
    ///
    /// The body is free-form; no schema is imposed on it.
    async fn action(&self, key: &ScopeKey, name: &str, body: &Value) -> Result<(Snapshot, Item)>;

    /// Run a named server-side action against a collection
    async fn all_action(
        &self,
        name: &str,
        body: &Value,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)>;

    /// Run a named finder query over a collection
    async fn find(
        &self,
        finder: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)>;

    /// Write an item into the cache as-is
    async fn set(&self, key: &ScopeKey, item: Item) -> Result<(Snapshot, Item)>;

    /// Compute a named read-only facet of one item
    async fn facet(&self, key: &ScopeKey, name: &str, params: &Params)
        -> Result<(Snapshot, Value)>;

    /// Compute a named read-only facet of a collection
    async fn all_facet(
        &self,
        name: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Value)>;

    /// Subscribe to the source's change-event stream
    ///
    /// `None` means the source cannot notify; subscribers must treat that
    /// as "no live invalidation", not as an error.
    fn events(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        None
    }
}
