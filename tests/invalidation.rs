//! Live invalidation through mounted scopes: debounced refetch, event
//! filtering, and guaranteed release on unmount.

mod common;

use common::{props, task_types};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trellis::{
    EventKind, InvalidationOptions, LocationChain, MemorySource, RefetchFn, Scope, ScopeConfig,
};

fn counter() -> (RefetchFn, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let held = count.clone();
    let refetch: RefetchFn = Arc::new(move || {
        held.fetch_add(1, Ordering::SeqCst);
    });
    (refetch, count)
}

fn list_chain() -> LocationChain {
    LocationChain::new(vec![trellis::LocKey::new("list", 1)])
}

#[tokio::test]
async fn burst_of_five_events_refetches_once() {
    let source = Arc::new(MemorySource::new(task_types()));
    let (refetch, count) = counter();
    let scope = Scope::mount(
        None,
        ScopeConfig::new(source, "task")
            .with_locations(list_chain())
            .with_invalidation(
                InvalidationOptions::all_kinds(Duration::from_millis(50)),
                refetch,
            ),
    );

    // 5 qualifying events inside 10ms
    for _ in 0..5 {
        scope.create(&props("burst")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn filtered_kinds_do_not_refetch() {
    let source = Arc::new(MemorySource::new(task_types()));
    let (refetch, count) = counter();
    let scope = Scope::mount(
        None,
        ScopeConfig::new(source, "task")
            .with_locations(list_chain())
            .with_invalidation(
                InvalidationOptions::new([EventKind::CacheCleared], Duration::from_millis(10)),
                refetch,
            ),
    );

    scope.create(&props("quiet")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_clear_drives_refetch() {
    let source = Arc::new(MemorySource::new(task_types()));
    let (refetch, count) = counter();
    let _scope = Scope::mount(
        None,
        ScopeConfig::new(source.clone(), "task")
            .with_locations(list_chain())
            .with_invalidation(
                InvalidationOptions::new([EventKind::CacheCleared], Duration::from_millis(10)),
                refetch,
            ),
    );

    source.clear();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn out_of_band_mutations_reach_the_subscriber() {
    // two scopes over one source: mutations through the second scope
    // invalidate the first
    let source = Arc::new(MemorySource::new(task_types()));
    let (refetch, count) = counter();
    let _watcher = Scope::mount(
        None,
        ScopeConfig::new(source.clone(), "task")
            .with_locations(list_chain())
            .with_invalidation(
                InvalidationOptions::all_kinds(Duration::from_millis(20)),
                refetch,
            ),
    );
    let writer = Scope::mount(
        None,
        ScopeConfig::new(source, "task").with_locations(list_chain()),
    );

    writer.create(&props("from elsewhere")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unmount_releases_the_subscription() {
    let source = Arc::new(MemorySource::new(task_types()));
    let (refetch, count) = counter();
    let scope = Scope::mount(
        None,
        ScopeConfig::new(source.clone(), "task")
            .with_locations(list_chain())
            .with_invalidation(
                InvalidationOptions::all_kinds(Duration::from_millis(10)),
                refetch,
            ),
    );
    scope.unmount();

    let writer = Scope::mount(
        None,
        ScopeConfig::new(source, "task").with_locations(list_chain()),
    );
    writer.create(&props("after unmount")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refetch_can_drive_a_finder_refresh() {
    // the supplied callback re-runs a finder; fired state is observable
    // through the refreshed facet results
    let source = Arc::new(MemorySource::new(task_types()).with_finder("recent", |_, items| {
        items.to_vec()
    }));
    let scope = Arc::new(Scope::mount(
        None,
        ScopeConfig::new(source.clone(), "task").with_locations(list_chain()),
    ));
    let refetched = Arc::new(AtomicUsize::new(0));

    let refetch: RefetchFn = {
        let scope = scope.clone();
        let refetched = refetched.clone();
        Arc::new(move || {
            let scope = scope.clone();
            let refetched = refetched.clone();
            tokio::spawn(async move {
                if scope.find("recent", &Default::default()).await.is_ok() {
                    refetched.fetch_add(1, Ordering::SeqCst);
                }
            });
        })
    };
    let subscription = trellis::subscribe(
        scope.binding().source().as_ref(),
        InvalidationOptions::all_kinds(Duration::from_millis(20)),
        refetch,
    );

    scope.create(&props("fresh")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(refetched.load(Ordering::SeqCst), 1);
    assert!(scope.state().facet_results.contains_key("recent"));
    subscription.unsubscribe();
}
