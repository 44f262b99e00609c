// SPDX-License-Identifier: Apache-2.0
//! Content payload model.
//!
//! A content value is the output of one computation and can carry up to three
//! forms at once: a serialized byte blob, one or more typed runtime
//! representations, and an error message. Callers only ever see the ref-typed
//! view [`ContentRef`]; the store-internal [`ContentRecord`] owns the forms
//! and grows its runtime-representation list lazily.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::ident::{wall_clock_nanos, ContentHash, HashMixer, InvocHash};

/// Type-erased runtime representation of a content value.
///
/// Pointer-stable for the lifetime of every [`ContentRef`] that holds it.
pub type RuntimeValue = Arc<dyn Any + Send + Sync>;

/// Decodes a serialized blob into a typed runtime form.
///
/// Runtime representations are tagged by this function pointer: equal pointer
/// means equal representation type. A deserializer must always produce a
/// value; decoding failures are represented inside the value itself (the
/// computation that produced undecodable bytes is the actual bug).
pub type DeserializeFn = fn(&[u8]) -> RuntimeValue;

/// Derives a content hash from a runtime-only value.
///
/// Optional escape hatch for values that cannot be serialized but can still
/// be identified (e.g. GPU handles keyed by their creation parameters).
pub type RuntimeHashFn = fn(&RuntimeValue) -> ContentHash;

/// The output of one computation.
#[derive(Default)]
pub struct ComputationResult {
    /// Serialized byte blob, if the value is serializable.
    pub serialized: Option<Bytes>,
    /// Typed runtime representation, if the computation produced one
    /// directly.
    pub runtime: Option<RuntimeValue>,
    /// Error message, if the computation failed. Errors are first-class
    /// content and cache like any other value.
    pub error: Option<String>,
}

impl ComputationResult {
    /// Result carrying only serialized bytes.
    #[must_use]
    pub fn from_serialized(blob: Bytes) -> Self {
        Self {
            serialized: Some(blob),
            ..Self::default()
        }
    }

    /// Result carrying only a runtime value.
    #[must_use]
    pub fn from_runtime(value: RuntimeValue) -> Self {
        Self {
            runtime: Some(value),
            ..Self::default()
        }
    }

    /// Result carrying an error message.
    #[must_use]
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// True if any of the three forms is present.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.serialized.is_some() || self.runtime.is_some() || self.error.is_some()
    }
}

impl std::fmt::Debug for ComputationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputationResult")
            .field("serialized", &self.serialized.as_ref().map(Bytes::len))
            .field("runtime", &self.runtime.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// The value carrier callers see.
///
/// Exactly one of `data`, `serialized`, `error` is meaningful, in that
/// priority. The ref pins the underlying content record's payloads, so it
/// stays readable for as long as the caller keeps it.
#[derive(Clone)]
pub struct ContentRef {
    /// Identity of the content.
    pub hash: ContentHash,
    /// Generation this content was computed for.
    pub generation: i64,
    /// If true, the data is not necessarily the most current; it stays
    /// accessible, and a recomputation is guaranteed to be scheduled.
    pub is_outdated: bool,
    /// Typed runtime representation, if one was materialized.
    pub data: Option<RuntimeValue>,
    /// Serialized bytes. Can be present alongside `data`.
    pub serialized: Option<Bytes>,
    /// Error message, if the producing computation failed.
    pub error: Option<Arc<str>>,
}

impl ContentRef {
    /// True if a runtime value is present.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.data.is_some()
    }

    /// True if this content is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Typed view of the runtime value.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }
}

impl std::fmt::Debug for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRef")
            .field("hash", &self.hash.to_string())
            .field("generation", &self.generation)
            .field("is_outdated", &self.is_outdated)
            .field("data", &self.data.is_some())
            .field("serialized", &self.serialized.as_ref().map(Bytes::len))
            .field("error", &self.error)
            .finish()
    }
}

// One runtime representation inside a content record, tagged by the
// deserializer that produced it (None for values the computation returned
// directly without a registered deserializer).
struct TaggedRuntime {
    tag: Option<DeserializeFn>,
    value: RuntimeValue,
}

/// Store-internal content record.
///
/// Immutable in identity: the serialized bytes and the error message never
/// change once inserted for a given [`ContentHash`]. The runtime
/// representation list may only grow (lazy deserialization), guarded by a
/// per-record mutex.
pub(crate) struct ContentRecord {
    serialized: Option<Bytes>,
    error: Option<Arc<str>>,
    runtime: Mutex<Vec<TaggedRuntime>>,
}

impl ContentRecord {
    /// Wraps a computation result. A runtime value produced directly by the
    /// computation is tagged with the producing resource's deserializer so
    /// later lookups for the same representation hit it.
    pub(crate) fn new(result: ComputationResult, tag: Option<DeserializeFn>) -> Self {
        Self {
            serialized: result.serialized,
            error: result.error.map(Arc::from),
            runtime: Mutex::new(
                result
                    .runtime
                    .map(|value| vec![TaggedRuntime { tag, value }])
                    .unwrap_or_default(),
            ),
        }
    }

    pub(crate) fn has_data(&self) -> bool {
        self.serialized.is_some() || self.error.is_some() || !self.runtime.lock().is_empty()
    }

    /// True if this record can be persisted (serialized bytes or an error;
    /// runtime-only values never leave the process).
    pub(crate) fn has_serializable_data(&self) -> bool {
        self.serialized.is_some() || self.error.is_some()
    }

    /// Builds a ref for callers, materializing the requested runtime
    /// representation if it is missing.
    ///
    /// Representations are matched by deserializer pointer. If no match
    /// exists and the record carries serialized bytes, the deserializer runs
    /// under the record mutex and the new representation is appended; its
    /// location is stable for the remaining lifetime of the record. An
    /// untagged lookup falls back to the sole stored representation.
    #[allow(unpredictable_function_pointer_comparisons)] // tag identity is the contract
    pub(crate) fn make_ref(
        &self,
        generation: i64,
        hash: ContentHash,
        deserialize: Option<DeserializeFn>,
    ) -> ContentRef {
        debug_assert!(self.has_data(), "content record without any payload");

        if let Some(error) = &self.error {
            return ContentRef {
                hash,
                generation,
                is_outdated: false,
                data: None,
                serialized: None,
                error: Some(Arc::clone(error)),
            };
        }

        let data = {
            let mut runtime = self.runtime.lock();
            if let Some(repr) = runtime.iter().find(|repr| repr.tag == deserialize) {
                Some(Arc::clone(&repr.value))
            } else if let (Some(deserialize), Some(blob)) = (deserialize, &self.serialized) {
                trace!(content = %hash.short(), "lazily deserializing content");
                let value = deserialize(blob);
                runtime.push(TaggedRuntime {
                    tag: Some(deserialize),
                    value: Arc::clone(&value),
                });
                Some(value)
            } else {
                runtime.first().map(|repr| Arc::clone(&repr.value))
            }
        };

        ContentRef {
            hash,
            generation,
            is_outdated: false,
            data,
            serialized: self.serialized.clone(),
            error: None,
        }
    }

    /// Builds a ref exposing only the persistable forms (serialized bytes or
    /// the error message), never runtime data.
    pub(crate) fn make_serialize_ref(&self, generation: i64, hash: ContentHash) -> ContentRef {
        debug_assert!(self.has_serializable_data());
        ContentRef {
            hash,
            generation,
            is_outdated: false,
            data: None,
            serialized: if self.error.is_none() {
                self.serialized.clone()
            } else {
                None
            },
            error: self.error.clone(),
        }
    }
}

// Case discriminators mixed into every content hash so the four construction
// cases can never collide with each other.
const CONTENT_CASE_SERIALIZED: u32 = 1000;
const CONTENT_CASE_ERROR: u32 = 2000;
const CONTENT_CASE_RUNTIME_HASHED: u32 = 3000;
const CONTENT_CASE_RUNTIME_OPAQUE: u32 = 4000;

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Derives the identity of a computation result.
///
/// - serialized bytes hash the bytes alone (same bytes, same content,
///   regardless of which invocation produced them);
/// - errors hash the message alone;
/// - runtime-only values with a custom hasher hash whatever it returns;
/// - runtime-only values without one inherit the invocation identity, plus a
///   wall-clock/counter nonce when the resource is volatile (such content is
///   unique per invocation and deliberately defeats the content store).
///
/// # Panics
///
/// Panics if the result carries no payload at all.
#[must_use]
pub fn make_content_hash(
    result: &ComputationResult,
    invoc: InvocHash,
    runtime_hash: Option<RuntimeHashFn>,
    is_volatile: bool,
) -> ContentHash {
    let mut mixer = HashMixer::new();
    if let Some(blob) = &result.serialized {
        mixer.add_u32(CONTENT_CASE_SERIALIZED);
        mixer.add_bytes(blob);
    } else if let Some(error) = &result.error {
        mixer.add_u32(CONTENT_CASE_ERROR);
        mixer.add_str(error);
    } else if let (Some(make_hash), Some(value)) = (runtime_hash, &result.runtime) {
        mixer.add_u32(CONTENT_CASE_RUNTIME_HASHED);
        mixer.add_hash(make_hash(value).0);
    } else {
        assert!(
            result.runtime.is_some(),
            "computation result carries no payload"
        );
        mixer.add_u32(CONTENT_CASE_RUNTIME_OPAQUE);
        mixer.add_hash(invoc.0);
        if is_volatile {
            mixer.add_u64(wall_clock_nanos());
            mixer.add_u64(NONCE_COUNTER.fetch_add(1, Ordering::Relaxed));
        }
    }
    ContentHash(mixer.finish())
}
