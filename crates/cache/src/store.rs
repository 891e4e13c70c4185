//! Snapshot store: the local read view of the cache
//!
//! Holds exactly one current [`Snapshot`]. Every completed cache-source
//! call replaces it with the snapshot that call returned. Observers see
//! either the old or the new snapshot, never a partially-updated one.

use crate::snapshot::Snapshot;
use parking_lot::RwLock;
use std::sync::Arc;

/// Holder of the current local snapshot
///
/// `replace` is the only mutator. It is called once per completed
/// cache-source call, synchronously, with the snapshot that call returned.
/// The snapshot handed in is defensively copied at the boundary so later
/// source-internal mutation cannot retroactively alter a published view.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store holding the given initial snapshot
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial.detached())),
        }
    }

    /// The current snapshot
    ///
    /// Cheap to call; the returned handle stays valid after later
    /// replacements.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Atomically replace the held snapshot
    pub fn replace(&self, next: Snapshot) {
        let detached = Arc::new(next.detached());
        *self.current.write() = detached;
    }
}
