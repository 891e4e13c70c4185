//! Scope layer for Trellis
//!
//! This crate binds cache sources to a tree of consumer scopes:
//! - Binding: the per-scope operation facade over a cache source
//! - BindingFlags / BindingState: independent in-flight flags
//! - FacetResults: additive memoization store for facet/finder results
//! - ScopeState: the read-only surface each scope publishes downward
//! - InvalidationOptions / Subscription: debounced refetch on cache change
//! - Scope / ScopeNode / Attachment: the publish/subscribe scope tree

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod invalidation;
pub mod state;
pub mod tree;

pub use binding::{Binding, ScopeContext};
pub use invalidation::{subscribe, InvalidationOptions, RefetchFn, Subscription};
pub use state::{BindingFlags, BindingState, FacetResults, OpCategory, ScopeState};
pub use tree::{inherited_chain, Attachment, Scope, ScopeConfig, ScopeNode};
