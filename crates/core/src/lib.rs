//! Core types for Trellis
//!
//! This crate defines the foundational types used throughout the system:
//! - KeyType / KeyValue / PriKey / LocKey / ComKey / ScopeKey: hierarchical
//!   item identity
//! - LocationChain: ordered ancestor path scoping a collection
//! - Value: unified value enum for payloads and parameters
//! - Params / hash_params: order-independent parameter hashing
//! - Item: opaque keyed cache item
//! - EventKind / ChangeEvent: live-invalidation vocabulary
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod item;
pub mod params;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use events::{ChangeEvent, EventKind};
pub use item::Item;
pub use params::{hash_params, ParamError, Params};
pub use types::{ComKey, KeyError, KeyType, KeyValue, LocKey, LocationChain, PriKey, ScopeKey};
pub use value::Value;
