//! Aggregating decorator over a base cache source
//!
//! When a scope is configured with named aggregates, reads flowing through
//! the source are augmented: each returned item gets additional fetched
//! data attached under the aggregate's name, while the base source's call
//! contract is preserved exactly.
//!
//! Construction goes through [`build_source`], which decorates only when at
//! least one aggregate or event entry is configured and otherwise binds the
//! caller directly to the base source. Both paths satisfy the same
//! contract; decoration is decided once at scope construction, never per
//! call.

use crate::snapshot::Snapshot;
use crate::source::CacheSource;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use trellis_core::{
    ChangeEvent, Error, Item, KeyType, LocationChain, Params, Result, ScopeKey, Value,
};

/// Extracts the referenced key an aggregate should fetch, from an item
pub type KeyFromItem = Arc<dyn Fn(&Item) -> Option<ScopeKey> + Send + Sync>;

/// Builds the finder parameters an event aggregate should query with
pub type ParamsFromItem = Arc<dyn Fn(&Item) -> Params + Send + Sync>;

/// One named aggregate: fetch a referenced item and attach its payload
#[derive(Clone)]
pub struct AggregateSpec {
    /// Source holding the referenced items
    pub cache: Arc<dyn CacheSource>,
    /// How to derive the referenced key from an item
    pub key_from: KeyFromItem,
    /// Whether a missing reference or target attaches `Null` instead of
    /// failing the read
    pub optional: bool,
}

/// One named event aggregate: run a finder and attach the result list
#[derive(Clone)]
pub struct EventSpec {
    /// Source holding the derived items
    pub cache: Arc<dyn CacheSource>,
    /// Finder name to run on the event source
    pub finder: String,
    /// How to derive finder parameters from an item
    pub params_from: ParamsFromItem,
}

/// Mapping from aggregate name to fetch specification
#[derive(Clone, Default)]
pub struct AggregateConfig {
    aggregates: BTreeMap<String, AggregateSpec>,
    events: BTreeMap<String, EventSpec>,
}

impl AggregateConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named aggregate entry
    pub fn with_aggregate(mut self, name: impl Into<String>, spec: AggregateSpec) -> Self {
        self.aggregates.insert(name.into(), spec);
        self
    }

    /// Add a named event entry
    pub fn with_event(mut self, name: impl Into<String>, spec: EventSpec) -> Self {
        self.events.insert(name.into(), spec);
        self
    }

    /// Whether no entries are configured
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty() && self.events.is_empty()
    }
}

/// Bind a scope to its cache source, decorating only when configured
///
/// The null-object optimization: with no aggregate entries the base source
/// is returned as-is, not wrapped.
pub fn build_source(
    base: Arc<dyn CacheSource>,
    config: Option<AggregateConfig>,
) -> Arc<dyn CacheSource> {
    match config {
        Some(config) if !config.is_empty() => Arc::new(AggregatingSource::new(base, config)),
        _ => base,
    }
}

/// Decorator that augments read results with aggregate sub-fetches
pub struct AggregatingSource {
    base: Arc<dyn CacheSource>,
    config: AggregateConfig,
}

impl AggregatingSource {
    /// Wrap a base source with an aggregate configuration
    pub fn new(base: Arc<dyn CacheSource>, config: AggregateConfig) -> Self {
        Self { base, config }
    }

    async fn augment_item(&self, op: &str, mut item: Item) -> Result<Item> {
        for (name, spec) in &self.config.aggregates {
            let attached = match (spec.key_from)(&item) {
                Some(key) => {
                    let (_, found) = spec.cache.get(&key).await?;
                    match found {
                        Some(related) => related.data().clone(),
                        None if spec.optional => Value::Null,
                        None => {
                            return Err(Error::source(
                                op,
                                format!("aggregate '{name}' target not found: {}", key.abbrev()),
                            ))
                        }
                    }
                }
                None if spec.optional => Value::Null,
                None => {
                    return Err(Error::source(
                        op,
                        format!("aggregate '{name}' has no reference key on {}", item.key().abbrev()),
                    ))
                }
            };
            item = item.with_attached(name, attached);
        }
        for (name, spec) in &self.config.events {
            let params = (spec.params_from)(&item);
            let (_, found) = spec
                .cache
                .find(&spec.finder, &params, &LocationChain::empty())
                .await?;
            let list = Value::Array(found.iter().map(|i| i.data().clone()).collect());
            item = item.with_attached(name, list);
        }
        Ok(item)
    }

    async fn augment_items(&self, op: &str, items: Vec<Item>) -> Result<Vec<Item>> {
        let mut augmented = Vec::with_capacity(items.len());
        for item in items {
            augmented.push(self.augment_item(op, item).await?);
        }
        Ok(augmented)
    }

    async fn augment_optional(&self, op: &str, item: Option<Item>) -> Result<Option<Item>> {
        match item {
            Some(item) => Ok(Some(self.augment_item(op, item).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CacheSource for AggregatingSource {
    fn key_types(&self) -> &[KeyType] {
        self.base.key_types()
    }

    async fn all(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Vec<Item>)> {
        let (snapshot, items) = self.base.all(query, loc).await?;
        Ok((snapshot, self.augment_items("all", items).await?))
    }

    async fn one(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Option<Item>)> {
        let (snapshot, item) = self.base.one(query, loc).await?;
        Ok((snapshot, self.augment_optional("one", item).await?))
    }

    async fn create(&self, properties: &Value, loc: &LocationChain) -> Result<(Snapshot, Item)> {
        let (snapshot, item) = self.base.create(properties, loc).await?;
        Ok((snapshot, self.augment_item("create", item).await?))
    }

    async fn get(&self, key: &ScopeKey) -> Result<(Snapshot, Option<Item>)> {
        let (snapshot, item) = self.base.get(key).await?;
        Ok((snapshot, self.augment_optional("get", item).await?))
    }

    async fn remove(&self, key: &ScopeKey) -> Result<Snapshot> {
        self.base.remove(key).await
    }

    async fn retrieve(&self, key: &ScopeKey) -> Result<(Option<Snapshot>, Option<Item>)> {
        let (snapshot, item) = self.base.retrieve(key).await?;
        Ok((snapshot, self.augment_optional("retrieve", item).await?))
    }

    async fn update(&self, key: &ScopeKey, properties: &Value) -> Result<(Snapshot, Item)> {
        let (snapshot, item) = self.base.update(key, properties).await?;
        Ok((snapshot, self.augment_item("update", item).await?))
    }

    async fn action(&self, key: &ScopeKey, name: &str, body: &Value) -> Result<(Snapshot, Item)> {
        self.base.action(key, name, body).await
    }

    async fn all_action(
        &self,
        name: &str,
        body: &Value,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)> {
        self.base.all_action(name, body, loc).await
    }

    async fn find(
        &self,
        finder: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)> {
        self.base.find(finder, params, loc).await
    }

    async fn set(&self, key: &ScopeKey, item: Item) -> Result<(Snapshot, Item)> {
        self.base.set(key, item).await
    }

    async fn facet(
        &self,
        key: &ScopeKey,
        name: &str,
        params: &Params,
    ) -> Result<(Snapshot, Value)> {
        self.base.facet(key, name, params).await
    }

    async fn all_facet(
        &self,
        name: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Value)> {
        self.base.all_facet(name, params, loc).await
    }

    fn events(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        self.base.events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use trellis_core::KeyValue;

    fn owner_ref(item: &Item) -> Option<ScopeKey> {
        match item.data().get("owner_id") {
            Some(Value::String(id)) => Some(ScopeKey::primary("user", id.as_str())),
            _ => None,
        }
    }

    fn task_with_owner(owner: &str) -> Value {
        let mut map = BTreeMap::new();
        map.insert("owner_id".to_string(), Value::from(owner));
        Value::Object(map)
    }

    fn user(id: &str, name: &str) -> Item {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from(name));
        Item::new(ScopeKey::primary("user", id), Value::Object(map))
    }

    fn sources() -> (Arc<MemorySource>, Arc<MemorySource>) {
        let tasks = Arc::new(MemorySource::new(vec![KeyType::from("task")]));
        let users = Arc::new(MemorySource::new(vec![KeyType::from("user")]));
        users.seed([user("u1", "ada")]);
        (tasks, users)
    }

    fn owner_config(users: Arc<MemorySource>, optional: bool) -> AggregateConfig {
        AggregateConfig::new().with_aggregate(
            "owner",
            AggregateSpec {
                cache: users,
                key_from: Arc::new(owner_ref),
                optional,
            },
        )
    }

    // === Factory Selection ===

    #[test]
    fn test_factory_skips_decorator_without_config() {
        let (tasks, _) = sources();
        let base: Arc<dyn CacheSource> = tasks;
        let bound = build_source(base.clone(), None);
        assert!(Arc::ptr_eq(&base, &bound));
        let bound = build_source(base.clone(), Some(AggregateConfig::new()));
        assert!(Arc::ptr_eq(&base, &bound));
    }

    #[test]
    fn test_factory_decorates_with_config() {
        let (tasks, users) = sources();
        let base: Arc<dyn CacheSource> = tasks;
        let bound = build_source(base.clone(), Some(owner_config(users, false)));
        assert!(!Arc::ptr_eq(&base, &bound));
    }

    // === Augmentation ===

    #[tokio::test]
    async fn test_create_result_is_augmented() {
        let (tasks, users) = sources();
        let bound = build_source(tasks, Some(owner_config(users, false)));
        let (_, created) = bound
            .create(&task_with_owner("u1"), &LocationChain::empty())
            .await
            .unwrap();
        let owner = created.data().get("owner").unwrap();
        assert_eq!(owner.get("name"), Some(&Value::from("ada")));
    }

    #[tokio::test]
    async fn test_all_results_are_augmented() {
        let (tasks, users) = sources();
        let bound = build_source(tasks, Some(owner_config(users, false)));
        bound
            .create(&task_with_owner("u1"), &LocationChain::empty())
            .await
            .unwrap();
        let (_, items) = bound
            .all(&Params::new(), &LocationChain::empty())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].data().get("owner").is_some());
    }

    #[tokio::test]
    async fn test_missing_target_fails_required_aggregate() {
        let (tasks, users) = sources();
        let bound = build_source(tasks, Some(owner_config(users, false)));
        let result = bound
            .create(&task_with_owner("missing"), &LocationChain::empty())
            .await;
        assert!(matches!(result, Err(Error::SourceOperation { .. })));
    }

    #[tokio::test]
    async fn test_missing_target_attaches_null_when_optional() {
        let (tasks, users) = sources();
        let bound = build_source(tasks, Some(owner_config(users, true)));
        let (_, created) = bound
            .create(&task_with_owner("missing"), &LocationChain::empty())
            .await
            .unwrap();
        assert_eq!(created.data().get("owner"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_event_aggregate_attaches_finder_results() {
        let (tasks, _) = sources();
        let audits = Arc::new(
            MemorySource::new(vec![KeyType::from("audit")]).with_finder("forTask", |params, items| {
                let wanted = params.get("task").cloned().unwrap_or(Value::Null);
                items
                    .iter()
                    .filter(|i| i.data().get("task") == Some(&wanted))
                    .cloned()
                    .collect()
            }),
        );
        let mut entry = BTreeMap::new();
        entry.insert("task".to_string(), Value::from("t1"));
        audits.seed([Item::new(
            ScopeKey::primary("audit", KeyValue::random()),
            Value::Object(entry),
        )]);

        let config = AggregateConfig::new().with_event(
            "history",
            EventSpec {
                cache: audits,
                finder: "forTask".to_string(),
                params_from: Arc::new(|_item| {
                    let mut params = Params::new();
                    params.insert("task".to_string(), Value::from("t1"));
                    params
                }),
            },
        );
        let bound = build_source(tasks, Some(config));
        let (_, created) = bound
            .create(&Value::object(), &LocationChain::empty())
            .await
            .unwrap();
        match created.data().get("history") {
            Some(Value::Array(entries)) => assert_eq!(entries.len(), 1),
            other => panic!("expected attached history array, got {other:?}"),
        }
    }

    // === Contract Preservation ===

    #[tokio::test]
    async fn test_remove_passes_through() {
        let (tasks, users) = sources();
        let bound = build_source(tasks, Some(owner_config(users, true)));
        let (_, created) = bound
            .create(&task_with_owner("u1"), &LocationChain::empty())
            .await
            .unwrap();
        bound.remove(created.key()).await.unwrap();
        let (_, fetched) = bound.get(created.key()).await.unwrap();
        assert!(fetched.is_none());
    }
}
