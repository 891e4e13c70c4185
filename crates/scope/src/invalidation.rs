//! Debounced invalidation subscriptions
//!
//! Keeps a derived query fresh when the underlying cache mutates out of
//! band: qualifying change events (re)arm a single-shot timer, and when the
//! timer fires the supplied refetch callback runs exactly once for the
//! whole burst.
//!
//! A source without an event stream yields an inert subscription: "no live
//! invalidation" is a degraded mode, not an error.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use trellis_cache::CacheSource;
use trellis_core::EventKind;

/// What to subscribe to and how long to coalesce bursts
#[derive(Debug, Clone)]
pub struct InvalidationOptions {
    /// Event kinds that qualify as invalidation
    pub kinds: BTreeSet<EventKind>,
    /// Burst-coalescing window
    pub debounce: Duration,
}

impl InvalidationOptions {
    /// Subscribe to the given kinds with a debounce window
    pub fn new(kinds: impl IntoIterator<Item = EventKind>, debounce: Duration) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            debounce,
        }
    }

    /// Subscribe to every event kind
    pub fn all_kinds(debounce: Duration) -> Self {
        Self::new(EventKind::ALL, debounce)
    }
}

/// The refetch callback a subscription drives
pub type RefetchFn = Arc<dyn Fn() + Send + Sync>;

/// Handle to an active invalidation subscription
///
/// `unsubscribe` is idempotent and also runs on drop, so release is
/// guaranteed on every exit path: explicit unmount, early unmount, and
/// re-subscription after a changed source reference.
pub struct Subscription {
    cancel: Option<watch::Sender<bool>>,
    unsubscribed: AtomicBool,
}

impl Subscription {
    /// A subscription over a source with no event stream; unsubscribing is
    /// a no-op
    pub fn inert() -> Self {
        Self {
            cancel: None,
            unsubscribed: AtomicBool::new(true),
        }
    }

    /// Whether this subscription is actively listening
    pub fn is_active(&self) -> bool {
        !self.unsubscribed.load(Ordering::SeqCst)
    }

    /// Stop listening; safe to call more than once
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(cancel) = &self.cancel {
            let _ = cancel.send(true);
        }
        debug!("invalidation subscription released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Subscribe a refetch callback to a source's change events
///
/// Returns an inert subscription when the source exposes no event stream.
/// Each qualifying event (re)arms a single-shot timer for the debounce
/// window; when it fires, `refetch` runs once and the timer clears.
pub fn subscribe(
    source: &dyn CacheSource,
    options: InvalidationOptions,
    refetch: RefetchFn,
) -> Subscription {
    let Some(mut events) = source.events() else {
        debug!("source exposes no event stream; live invalidation disabled");
        return Subscription::inert();
    };
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let kinds = options.kinds;
    let debounce = options.debounce;

    tokio::spawn(async move {
        let mut deadline: Option<Instant> = None;
        loop {
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = cancel_rx.changed() => break,
                _ = timer => {
                    deadline = None;
                    refetch();
                }
                event = events.recv() => match event {
                    Ok(event) if kinds.contains(&event.kind) => {
                        deadline = Some(Instant::now() + debounce);
                    }
                    Ok(_) => {}
                    // dropped events still mean "something changed"
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        deadline = Some(Instant::now() + debounce);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        if deadline.is_some() {
                            refetch();
                        }
                        break;
                    }
                },
            }
        }
    });

    Subscription {
        cancel: Some(cancel_tx),
        unsubscribed: AtomicBool::new(false),
    }
}
