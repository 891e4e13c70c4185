//! Shared test helpers: key fixtures and an instrumented source wrapper

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use trellis::{
    CacheSource, ChangeEvent, Item, KeyType, LocationChain, Params, Result, ScopeKey, Snapshot,
    Value,
};

/// Route tracing output through the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn props(name: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::from(name));
    Value::Object(map)
}

pub fn params(entries: &[(&str, Value)]) -> Params {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn task_types() -> Vec<KeyType> {
    vec![KeyType::from("task"), KeyType::from("list")]
}

/// Wrapper that counts calls into a source and can delay each one,
/// for probing "source never invoked" and mid-flight unmount scenarios
pub struct InstrumentedSource {
    inner: Arc<dyn CacheSource>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl InstrumentedSource {
    pub fn new(inner: Arc<dyn CacheSource>) -> Self {
        Self {
            inner,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(inner: Arc<dyn CacheSource>, delay: Duration) -> Self {
        Self {
            inner,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CacheSource for InstrumentedSource {
    fn key_types(&self) -> &[KeyType] {
        self.inner.key_types()
    }

    async fn all(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Vec<Item>)> {
        self.touch().await;
        self.inner.all(query, loc).await
    }

    async fn one(&self, query: &Params, loc: &LocationChain) -> Result<(Snapshot, Option<Item>)> {
        self.touch().await;
        self.inner.one(query, loc).await
    }

    async fn create(&self, properties: &Value, loc: &LocationChain) -> Result<(Snapshot, Item)> {
        self.touch().await;
        self.inner.create(properties, loc).await
    }

    async fn get(&self, key: &ScopeKey) -> Result<(Snapshot, Option<Item>)> {
        self.touch().await;
        self.inner.get(key).await
    }

    async fn remove(&self, key: &ScopeKey) -> Result<Snapshot> {
        self.touch().await;
        self.inner.remove(key).await
    }

    async fn retrieve(&self, key: &ScopeKey) -> Result<(Option<Snapshot>, Option<Item>)> {
        self.touch().await;
        self.inner.retrieve(key).await
    }

    async fn update(&self, key: &ScopeKey, properties: &Value) -> Result<(Snapshot, Item)> {
        self.touch().await;
        self.inner.update(key, properties).await
    }

    async fn action(&self, key: &ScopeKey, name: &str, body: &Value) -> Result<(Snapshot, Item)> {
        self.touch().await;
        self.inner.action(key, name, body).await
    }

    async fn all_action(
        &self,
        name: &str,
        body: &Value,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)> {
        self.touch().await;
        self.inner.all_action(name, body, loc).await
    }

    async fn find(
        &self,
        finder: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Vec<Item>)> {
        self.touch().await;
        self.inner.find(finder, params, loc).await
    }

    async fn set(&self, key: &ScopeKey, item: Item) -> Result<(Snapshot, Item)> {
        self.touch().await;
        self.inner.set(key, item).await
    }

    async fn facet(
        &self,
        key: &ScopeKey,
        name: &str,
        params: &Params,
    ) -> Result<(Snapshot, Value)> {
        self.touch().await;
        self.inner.facet(key, name, params).await
    }

    async fn all_facet(
        &self,
        name: &str,
        params: &Params,
        loc: &LocationChain,
    ) -> Result<(Snapshot, Value)> {
        self.touch().await;
        self.inner.all_facet(name, params, loc).await
    }

    fn events(&self) -> Option<broadcast::Receiver<ChangeEvent>> {
        self.inner.events()
    }
}
