//! Items: opaque keyed values produced and consumed by the cache
//!
//! The binding machinery never inspects an item's payload beyond its key.
//! Aggregation attaches named sub-resources into the payload object without
//! touching anything else.

use crate::types::ScopeKey;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cached item: a hierarchical key plus an opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    key: ScopeKey,
    data: Value,
}

impl Item {
    /// Create a new item
    pub fn new(key: ScopeKey, data: Value) -> Self {
        Self { key, data }
    }

    /// The item's key
    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    /// The item's payload
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Replace the payload, returning a new item
    pub fn with_data(&self, data: Value) -> Self {
        Self {
            key: self.key.clone(),
            data,
        }
    }

    /// Attach a named sub-resource into the payload object, returning a
    /// new item
    ///
    /// A non-object payload is promoted to an object first; the original
    /// payload is preserved under the `"value"` field.
    pub fn with_attached(&self, name: &str, value: Value) -> Self {
        let mut map = match &self.data {
            Value::Object(map) => map.clone(),
            Value::Null => BTreeMap::new(),
            other => {
                let mut map = BTreeMap::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        map.insert(name.to_string(), value);
        Self {
            key: self.key.clone(),
            data: Value::Object(map),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Item {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from("widget"));
        Item::new(ScopeKey::primary("widget", 1), Value::Object(map))
    }

    #[test]
    fn test_item_accessors() {
        let item = widget();
        assert_eq!(item.key().abbrev(), "widget:1");
        assert_eq!(item.data().get("name"), Some(&Value::from("widget")));
    }

    #[test]
    fn test_with_data_keeps_key() {
        let item = widget().with_data(Value::Null);
        assert_eq!(item.key().abbrev(), "widget:1");
        assert!(item.data().is_null());
    }

    #[test]
    fn test_attach_into_object() {
        let item = widget().with_attached("owner", Value::from("ada"));
        assert_eq!(item.data().get("owner"), Some(&Value::from("ada")));
        // original field survives
        assert_eq!(item.data().get("name"), Some(&Value::from("widget")));
    }

    #[test]
    fn test_attach_promotes_non_object() {
        let item = Item::new(ScopeKey::primary("widget", 2), Value::Int(9))
            .with_attached("owner", Value::from("ada"));
        assert_eq!(item.data().get("value"), Some(&Value::Int(9)));
        assert_eq!(item.data().get("owner"), Some(&Value::from("ada")));
    }

    #[test]
    fn test_attach_does_not_mutate_original() {
        let item = widget();
        let _ = item.with_attached("owner", Value::from("ada"));
        assert_eq!(item.data().get("owner"), None);
    }
}
