// SPDX-License-Identifier: Apache-2.0
//! Typed external handles over resource slots.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::content::ContentRef;
use crate::ident::ResHash;
use crate::slot::ResourceSlot;

/// A lightweight, clonable handle to one resource, typed by the runtime
/// representation its content deserializes to.
///
/// A handle is part future, part shared pointer: [`try_get`](Self::try_get)
/// returns the value if it is available (scheduling computation otherwise)
/// and pins it for as long as the returned `Arc` lives. Cloning a handle
/// increments the resource's external reference count; dropping it
/// decrements. Handles are not pinned to a thread.
pub struct Handle<T> {
    slot: Arc<ResourceSlot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Handle<T> {
    /// Wraps a slot obtained from
    /// [`ResourceSystem::resource_slot`](crate::ResourceSystem::resource_slot).
    #[must_use]
    pub fn from_slot(slot: Arc<ResourceSlot>) -> Self {
        slot.refs().inc();
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// The resource identity behind this handle.
    #[must_use]
    pub fn hash(&self) -> ResHash {
        self.slot.resource()
    }

    /// Returns the typed value if it is computed, scheduling computation
    /// otherwise.
    ///
    /// Outdated cached values are returned too (recomputation is still
    /// triggered); error content and type mismatches yield `None`. Usage:
    ///
    /// ```ignore
    /// if let Some(v) = my_handle.try_get() {
    ///     use_value(&v);
    /// }
    /// ```
    #[must_use]
    pub fn try_get(&self) -> Option<Arc<T>> {
        let content = self.slot.try_get()?;
        content.data.and_then(|value| value.downcast::<T>().ok())
    }

    /// Untyped variant of [`try_get`](Self::try_get): the raw content ref,
    /// including error content and outdated flags.
    #[must_use]
    pub fn try_get_content(&self) -> Option<ContentRef> {
        self.slot.try_get()
    }

    /// True if the resource can be used immediately (also implies
    /// error-free). Only updated after a `try_get`.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.slot.is_loaded()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        self.slot.refs().inc();
        Self {
            slot: Arc::clone(&self.slot),
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        // Cleanup of unreferenced resources is left to a future GC pass.
        self.slot.refs().dec();
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("resource", &self.slot.resource().to_string())
            .finish_non_exhaustive()
    }
}
