//! Cache layer for Trellis
//!
//! This crate holds the local read view of an externally-owned item cache:
//! - Snapshot: immutable point-in-time view, fresh identity per call
//! - SnapshotStore: the single current snapshot, replaced atomically
//! - CacheSource: the async contract the external cache exposes
//! - AggregatingSource / build_source: decorator augmenting reads with
//!   named sub-fetches, selected once at construction
//! - MemorySource: embedded reference implementation of the contract

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod memory;
pub mod snapshot;
pub mod source;
pub mod store;

pub use aggregate::{
    build_source, AggregateConfig, AggregateSpec, AggregatingSource, EventSpec, KeyFromItem,
    ParamsFromItem,
};
pub use memory::MemorySource;
pub use snapshot::{Snapshot, SnapshotId};
pub use source::CacheSource;
pub use store::SnapshotStore;
