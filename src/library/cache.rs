//! Artifact cache with LRU eviction and single-flight loading
//!
//! Each book id maps to a shared slot. Concurrent misses for the same id
//! await the same slot, so the artifact is read from storage once.
//!
//! # Thread Safety
//!
//! The slot table sits behind a `parking_lot::Mutex` that is never held
//! across an await point. Loading happens inside the slot's
//! `tokio::sync::OnceCell`.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::document::Document;

/// Capacity used when the configured one is zero
const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

type Slot = Arc<OnceCell<Arc<Document>>>;

/// Cache occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Loaded artifacts currently held
    pub entries: usize,
    pub capacity: usize,
}

/// Bounded cache of loaded artifacts keyed by book id
pub struct ArtifactCache {
    slots: Mutex<LruCache<String, Slot>>,
    capacity: NonZeroUsize,
}

impl ArtifactCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            capacity,
        }
    }

    /// Return the cached artifact or load it with `load`
    ///
    /// A hit on a loaded slot returns without awaiting. Failed loads are not
    /// cached; the next call tries again.
    pub async fn get_or_load<F, Fut, E>(&self, id: &str, load: F) -> Result<Arc<Document>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Document, E>>,
    {
        let slot = self.slot(id);
        if let Some(document) = slot.get() {
            return Ok(Arc::clone(document));
        }

        let result = slot
            .get_or_try_init(|| async move { load().await.map(Arc::new) })
            .await
            .map(Arc::clone);

        if result.is_err() {
            let mut slots = self.slots.lock();
            if slots.peek(id).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                slots.pop(id);
            }
        }
        result
    }

    /// Loaded artifact, if present
    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        let mut slots = self.slots.lock();
        slots.get(id).and_then(|slot| slot.get().cloned())
    }

    /// Drop one id; the next read reloads from storage
    pub fn invalidate(&self, id: &str) {
        if self.slots.lock().pop(id).is_some() {
            tracing::debug!(book_id = %id, "Invalidated cached artifact");
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.lock();
        CacheStats {
            entries: slots.iter().filter(|(_, slot)| slot.initialized()).count(),
            capacity: self.capacity.get(),
        }
    }

    fn slot(&self, id: &str) -> Slot {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(id) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.put(id.to_string(), Arc::clone(&slot));
        slot
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY.get())
    }
}
