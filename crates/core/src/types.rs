//! Hierarchical key types for Trellis
//!
//! This module defines the identity model:
//! - KeyType: type discriminator for item kinds
//! - KeyValue: scalar key value (string, integer, or UUID)
//! - PriKey: primary key (type + value)
//! - LocKey: one ancestor location key
//! - LocationChain: ordered ancestor path, nearest first
//! - ComKey: composite key (primary key + location chain)
//! - ScopeKey: either a primary or a composite key
//!
//! ## Contract
//!
//! Keys are immutable once constructed. A composite key's location chain is
//! ordered from the nearest to the furthest ancestor, and its key types must
//! match the declared type chain of the scope that issued it (checked by
//! [`ScopeKey::matches_types`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Type discriminator for item kinds
///
/// A KeyType names the kind of item a key identifies ("task", "list",
/// "board"). Scopes declare an ordered chain of key types: the item's own
/// type first, then the ancestor container types nearest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyType(String);

impl KeyType {
    /// Create a new key type
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the type name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KeyType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar key value
///
/// Key values are strings, integers, or UUIDs. Different variants are never
/// equal, even when their textual forms coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    /// String-valued key
    Str(String),
    /// Integer-valued key
    Int(i64),
    /// UUID-valued key
    Uuid(Uuid),
}

impl KeyValue {
    /// Create a fresh random UUID key value
    pub fn random() -> Self {
        Self::Uuid(Uuid::new_v4())
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Str(s) => write!(f, "{s}"),
            KeyValue::Int(i) => write!(f, "{i}"),
            KeyValue::Uuid(u) => write!(f, "{u}"),
        }
    }
}

/// Primary key: item type plus scalar value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriKey {
    /// Item key type
    pub kt: KeyType,
    /// Primary key value
    pub pk: KeyValue,
}

impl PriKey {
    /// Create a new primary key
    pub fn new(kt: impl Into<KeyType>, pk: impl Into<KeyValue>) -> Self {
        Self {
            kt: kt.into(),
            pk: pk.into(),
        }
    }
}

impl fmt::Display for PriKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kt, self.pk)
    }
}

/// Location key: one ancestor container in a containment hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocKey {
    /// Ancestor key type
    pub kt: KeyType,
    /// Ancestor key value
    pub lk: KeyValue,
}

impl LocKey {
    /// Create a new location key
    pub fn new(kt: impl Into<KeyType>, lk: impl Into<KeyValue>) -> Self {
        Self {
            kt: kt.into(),
            lk: lk.into(),
        }
    }
}

impl fmt::Display for LocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kt, self.lk)
    }
}

/// Ordered ancestor-key path scoping a collection of items
///
/// The chain is ordered from the nearest ancestor to the furthest. An empty
/// chain means "top-level". Operations that require containment context
/// treat an *unresolvable* chain (no chain at all) as an error condition,
/// never a silent no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationChain(Vec<LocKey>);

impl LocationChain {
    /// Create a chain from location keys ordered nearest first
    pub fn new(locs: Vec<LocKey>) -> Self {
        Self(locs)
    }

    /// The empty (top-level) chain
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Number of ancestors in the chain
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chain has no ancestors
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the location keys, nearest first
    pub fn iter(&self) -> std::slice::Iter<'_, LocKey> {
        self.0.iter()
    }

    /// The key types of the chain, nearest first
    pub fn key_types(&self) -> Vec<KeyType> {
        self.0.iter().map(|l| l.kt.clone()).collect()
    }

    /// Prepend a nearest ancestor, returning a new chain
    pub fn nested_under(&self, nearest: LocKey) -> Self {
        let mut locs = Vec::with_capacity(self.0.len() + 1);
        locs.push(nearest);
        locs.extend(self.0.iter().cloned());
        Self(locs)
    }
}

impl From<Vec<LocKey>> for LocationChain {
    fn from(locs: Vec<LocKey>) -> Self {
        Self(locs)
    }
}

impl fmt::Display for LocationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|l| l.to_string()).collect();
        write!(f, "{}", parts.join(" > "))
    }
}

/// Composite key: primary key plus location chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComKey {
    /// Item key type
    pub kt: KeyType,
    /// Primary key value
    pub pk: KeyValue,
    /// Ancestor location chain, nearest first
    pub loc: LocationChain,
}

impl fmt::Display for ComKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} @ {}", self.kt, self.pk, self.loc)
    }
}

/// Hierarchical identity of one item
///
/// Either a bare primary key (top-level item) or a composite key carrying
/// the ordered location chain of the containers the item lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeKey {
    /// Primary key without containment context
    Primary(PriKey),
    /// Primary key plus ancestor location chain
    Composite(ComKey),
}

impl ScopeKey {
    /// Create a primary (top-level) key
    pub fn primary(kt: impl Into<KeyType>, pk: impl Into<KeyValue>) -> Self {
        Self::Primary(PriKey::new(kt, pk))
    }

    /// Create a composite key with a location chain
    pub fn composite(
        kt: impl Into<KeyType>,
        pk: impl Into<KeyValue>,
        loc: LocationChain,
    ) -> Self {
        Self::Composite(ComKey {
            kt: kt.into(),
            pk: pk.into(),
            loc,
        })
    }

    /// The item's own key type
    pub fn key_type(&self) -> &KeyType {
        match self {
            ScopeKey::Primary(p) => &p.kt,
            ScopeKey::Composite(c) => &c.kt,
        }
    }

    /// The primary key value
    pub fn value(&self) -> &KeyValue {
        match self {
            ScopeKey::Primary(p) => &p.pk,
            ScopeKey::Composite(c) => &c.pk,
        }
    }

    /// The location chain, if any
    pub fn location(&self) -> Option<&LocationChain> {
        match self {
            ScopeKey::Primary(_) => None,
            ScopeKey::Composite(c) => Some(&c.loc),
        }
    }

    /// Compact display form: `kt:pk` or `kt:pk@loc1/loc2`
    pub fn abbrev(&self) -> String {
        match self {
            ScopeKey::Primary(p) => format!("{}:{}", p.kt, p.pk),
            ScopeKey::Composite(c) => {
                let locs: Vec<String> = c.loc.iter().map(|l| l.to_string()).collect();
                format!("{}:{}@{}", c.kt, c.pk, locs.join("/"))
            }
        }
    }

    /// Validate this key against a declared key-type chain
    ///
    /// `declared[0]` is the item's own type; `declared[1..]` are the ancestor
    /// container types, nearest first. A primary key matches a declaration
    /// with no ancestors; a composite key's chain types must match position
    /// by position.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] when the declaration is empty, the depths
    /// differ, or a key type does not match its declared position.
    pub fn matches_types(&self, declared: &[KeyType]) -> Result<(), KeyError> {
        let Some(own) = declared.first() else {
            return Err(KeyError::EmptyDeclaration);
        };
        if self.key_type() != own {
            return Err(KeyError::TypeMismatch {
                expected: own.clone(),
                actual: self.key_type().clone(),
            });
        }
        let empty = LocationChain::empty();
        let chain = self.location().unwrap_or(&empty);
        let ancestors = &declared[1..];
        if chain.len() != ancestors.len() {
            return Err(KeyError::ChainDepth {
                expected: ancestors.len(),
                actual: chain.len(),
            });
        }
        for (lk, expected) in chain.iter().zip(ancestors.iter()) {
            if &lk.kt != expected {
                return Err(KeyError::TypeMismatch {
                    expected: expected.clone(),
                    actual: lk.kt.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Primary(p) => write!(f, "{p}"),
            ScopeKey::Composite(c) => write!(f, "{c}"),
        }
    }
}

/// Key validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The declared key-type chain was empty
    #[error("Declared key-type chain cannot be empty")]
    EmptyDeclaration,

    /// A key type did not match its declared position
    #[error("Key type mismatch: expected '{expected}', got '{actual}'")]
    TypeMismatch {
        /// Declared key type at this position
        expected: KeyType,
        /// Key type actually found
        actual: KeyType,
    },

    /// The location chain depth did not match the declaration
    #[error("Location chain depth mismatch: expected {expected} ancestors, got {actual}")]
    ChainDepth {
        /// Declared number of ancestors
        expected: usize,
        /// Actual number of ancestors
        actual: usize,
    },
}
