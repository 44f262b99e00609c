// SPDX-License-Identifier: Apache-2.0
//! Resource slots: the pointer-stable records external handles wrap.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::content::ContentRef;
use crate::ident::ResHash;
use crate::system::ResourceSystem;

/// External reference counter of one resource.
///
/// Initialized to 1 (the system's own reference when the resource is
/// defined); every live [`Handle`](crate::Handle) adds one. The engine only
/// reads the count — reclaiming unreferenced resources is a future garbage
/// collection concern.
///
/// Cache-line aligned so hot handle copies on different resources never
/// contend on one line.
#[repr(align(64))]
#[derive(Debug)]
pub struct RefCount {
    count: AtomicI32,
}

impl RefCount {
    /// Creates a counter holding one reference.
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: AtomicI32::new(1),
        }
    }

    /// Adds one reference.
    pub fn inc(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one reference.
    pub fn dec(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Current reference count.
    #[must_use]
    pub fn count(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-resource slot shared by all handles to that resource.
///
/// Heap-allocated (behind `Arc`) and therefore pointer-stable for its whole
/// lifetime. The slot caches the last [`ContentRef`] it saw together with
/// the generation it was current for, making the handle fast path a single
/// integer comparison.
#[derive(Debug)]
pub struct ResourceSlot {
    // Dedicated first field: the externally observable reference count.
    refs: Arc<RefCount>,

    resource: ResHash,
    system: Weak<ResourceSystem>,

    cached_gen: AtomicI64,
    cached: RwLock<Option<ContentRef>>,
}

impl ResourceSlot {
    pub(crate) fn new(
        system: Weak<ResourceSystem>,
        resource: ResHash,
        refs: Arc<RefCount>,
    ) -> Self {
        Self {
            refs,
            resource,
            system,
            cached_gen: AtomicI64::new(-1),
            cached: RwLock::new(None),
        }
    }

    /// The resource this slot caches.
    #[must_use]
    pub fn resource(&self) -> ResHash {
        self.resource
    }

    /// Current external reference count of the resource.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.refs.count()
    }

    pub(crate) fn refs(&self) -> &RefCount {
        &self.refs
    }

    /// Looks up the resource content through the slot cache.
    ///
    /// Hot path: if the cached generation is still current, the cached ref
    /// is returned without touching any store. Otherwise the engine is
    /// consulted (scheduling computation as a side effect) and the cached
    /// fields are refreshed. The returned ref can be absent or outdated;
    /// outdated content is usable and will be recomputed.
    #[must_use]
    pub fn try_get(&self) -> Option<ContentRef> {
        let system = self.system.upgrade()?;

        if system.is_up_to_date(self.cached_gen.load(Ordering::Acquire)) {
            return self.cached.read().clone();
        }

        let content = system.try_get_resource_content(self.resource, true);
        if let Some(content) = &content {
            *self.cached.write() = Some(content.clone());
            // An outdated ref keeps its old generation, so the fast path
            // stays cold until fresh content lands.
            self.cached_gen.store(content.generation, Ordering::Release);
        }
        content
    }

    /// True if the slot holds a usable, error-free value (possibly
    /// outdated). Only updated by [`Self::try_get`].
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cached.read().as_ref().is_some_and(ContentRef::has_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_count_starts_at_one() {
        let count = RefCount::new();
        assert_eq!(count.count(), 1);
        count.inc();
        count.inc();
        assert_eq!(count.count(), 3);
        count.dec();
        assert_eq!(count.count(), 2);
    }

    #[test]
    fn slot_without_a_system_yields_nothing() {
        let slot = ResourceSlot::new(
            Weak::new(),
            ResHash(crate::make_algo_hash("r", 1)),
            Arc::new(RefCount::new()),
        );
        assert!(slot.try_get().is_none());
        assert!(!slot.is_loaded());
    }
}
