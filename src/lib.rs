//! Trellis - hierarchical cache binding for scoped consumers
//!
//! Trellis keeps a local read view synchronized with a stateful,
//! externally-owned item cache across CRUD operations, server-side
//! actions, facets, and finder queries. Items carry hierarchical keys
//! (a primary key plus an ordered chain of ancestor locations) and
//! consumers are arranged in a matching tree of scopes: a scope bound to
//! a parent item supplies its location to every descendant scope.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis::{LocationChain, MemorySource, Scope, ScopeConfig, Value};
//!
//! let lists = Arc::new(MemorySource::new(vec!["list".into()]));
//! let tasks = Arc::new(MemorySource::new(vec!["task".into(), "list".into()]));
//!
//! // a root scope pinned to the top level
//! let list_scope = Scope::mount(
//!     None,
//!     ScopeConfig::new(lists, "list").with_locations(LocationChain::empty()),
//! );
//! let list = list_scope.create(&Value::object()).await?;
//! list_scope.bind_item(list.key().clone());
//!
//! // a child scope constrained by the parent's published item
//! let task_scope = Scope::mount(Some(list_scope.node()), ScopeConfig::new(tasks, "task"));
//! let task = task_scope.create(&Value::object()).await?;
//! assert!(task.key().location().is_some());
//! ```
//!
//! # Architecture
//!
//! - `trellis-core`: keys, values, parameter hashing, events, errors
//! - `trellis-cache`: snapshots, the snapshot store, the async
//!   `CacheSource` contract, the aggregating decorator
//! - `trellis-scope`: per-scope bindings, debounced invalidation, and the
//!   publish/subscribe scope tree

pub use trellis_cache::{
    build_source, AggregateConfig, AggregateSpec, AggregatingSource, CacheSource, EventSpec,
    MemorySource, Snapshot, SnapshotId, SnapshotStore,
};
pub use trellis_core::{
    hash_params, ChangeEvent, ComKey, Error, EventKind, Item, KeyError, KeyType, KeyValue, LocKey,
    LocationChain, ParamError, Params, PriKey, Result, ScopeKey, Value,
};
pub use trellis_scope::{
    inherited_chain, subscribe, Attachment, Binding, BindingFlags, BindingState, FacetResults,
    InvalidationOptions, OpCategory, RefetchFn, Scope, ScopeConfig, ScopeContext, ScopeNode,
    ScopeState, Subscription,
};
