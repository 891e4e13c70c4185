//! Change-event vocabulary for live invalidation
//!
//! Cache sources emit [`ChangeEvent`]s when their contents mutate out of
//! band. The vocabulary is fixed; subscribers filter by [`EventKind`] and
//! coalesce bursts before refetching.

use crate::types::ScopeKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of cache change event
///
/// The wire names (`as_str`/`from_str`) are part of the contract and MUST
/// NOT change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// A new item entered the cache
    ItemCreated,
    /// An existing item's payload changed
    ItemUpdated,
    /// An item left the cache
    ItemRemoved,
    /// A derived query's result set is no longer trustworthy
    QueryInvalidated,
    /// The whole cache was cleared
    CacheCleared,
}

impl EventKind {
    /// All event kinds
    pub const ALL: [EventKind; 5] = [
        EventKind::ItemCreated,
        EventKind::ItemUpdated,
        EventKind::ItemRemoved,
        EventKind::QueryInvalidated,
        EventKind::CacheCleared,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemCreated => "item_created",
            EventKind::ItemUpdated => "item_updated",
            EventKind::ItemRemoved => "item_removed",
            EventKind::QueryInvalidated => "query_invalidated",
            EventKind::CacheCleared => "cache_cleared",
        }
    }

    /// Parse a wire name
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "item_created" => Some(EventKind::ItemCreated),
            "item_updated" => Some(EventKind::ItemUpdated),
            "item_removed" => Some(EventKind::ItemRemoved),
            "query_invalidated" => Some(EventKind::QueryInvalidated),
            "cache_cleared" => Some(EventKind::CacheCleared),
            _ => None,
        }
    }
}

/// One cache change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened
    pub kind: EventKind,
    /// The affected item, when the event concerns a single item
    pub key: Option<ScopeKey>,
    /// When the event was emitted
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind, key: Option<ScopeKey>) -> Self {
        Self {
            kind,
            key,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_roundtrip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_wire_name() {
        assert_eq!(EventKind::from_str("item_exploded"), None);
    }

    #[test]
    fn test_event_carries_key() {
        let key = ScopeKey::primary("task", 1);
        let event = ChangeEvent::new(EventKind::ItemRemoved, Some(key.clone()));
        assert_eq!(event.kind, EventKind::ItemRemoved);
        assert_eq!(event.key, Some(key));
    }
}
