// SPDX-License-Identifier: Apache-2.0
//! Demo arithmetic computations: typed `f64`/`i64` constants, addition over
//! resource arguments, and a volatile watcher over a shared integer cell.
//!
//! This is the smallest end-to-end use of the engine: payloads are plain
//! little-endian numbers, computations are closures, and handles are typed.
//! Tests and doc examples build their graphs from these helpers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::content::{ComputationResult, ContentRef, RuntimeValue};
use crate::error::ResourceError;
use crate::handle::Handle;
use crate::ident::{make_algo_hash, make_type_hash, make_unique_hash, HashMixer};
use crate::system::{ComputationDesc, ResourceDesc, ResourceSystem};

/// Encodes an `f64` as its 8-byte little-endian payload.
#[must_use]
pub fn encode_f64(value: f64) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

/// Decodes an 8-byte little-endian `f64` payload.
#[must_use]
pub fn decode_f64(bytes: &[u8]) -> Option<f64> {
    Some(f64::from_le_bytes(bytes.try_into().ok()?))
}

/// Deserializer for `f64` payloads. Undecodable bytes surface as NaN; the
/// computation that produced them is the actual bug.
#[must_use]
pub fn deserialize_f64(bytes: &[u8]) -> RuntimeValue {
    Arc::new(decode_f64(bytes).unwrap_or(f64::NAN))
}

/// Encodes an `i64` as its 8-byte little-endian payload.
#[must_use]
pub fn encode_i64(value: i64) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

/// Decodes an 8-byte little-endian `i64` payload.
#[must_use]
pub fn decode_i64(bytes: &[u8]) -> Option<i64> {
    Some(i64::from_le_bytes(bytes.try_into().ok()?))
}

/// Deserializer for `i64` payloads.
#[must_use]
pub fn deserialize_i64(bytes: &[u8]) -> RuntimeValue {
    Arc::new(decode_i64(bytes).unwrap_or(0))
}

/// Defines the shared `add` computation: sums any number of `f64` arguments.
///
/// Any argument carrying error content short-circuits into an error result,
/// so failures propagate through dependency chains without invoking user
/// logic on garbage.
pub fn add_computation(system: &ResourceSystem) -> crate::CompHash {
    system.define_computation(ComputationDesc {
        algo_hash: make_algo_hash("demo/arith/add", 1),
        type_hash: make_type_hash("f64"),
        compute: Arc::new(|args| {
            if args.iter().any(ContentRef::has_error) {
                return ResourceError::missing_dependency().into();
            }
            let mut sum = 0.0f64;
            for arg in args {
                match arg.downcast_ref::<f64>() {
                    Some(value) => sum += value,
                    None => return ResourceError::from_user("argument is not an f64").into(),
                }
            }
            ComputationResult::from_serialized(encode_f64(sum))
        }),
        deserialize: Some(deserialize_f64),
        runtime_hash: None,
    })
}

/// Defines a constant `f64` resource and returns a typed handle to it.
///
/// The value is captured in the computation, so the algorithm identity is an
/// anonymous unique hash; constants are neither volatile nor persisted.
pub fn constant_f64(system: &Arc<ResourceSystem>, value: f64) -> Handle<f64> {
    let comp = system.define_computation(ComputationDesc {
        algo_hash: make_unique_hash(),
        type_hash: make_type_hash("f64"),
        compute: Arc::new(move |_args| ComputationResult::from_serialized(encode_f64(value))),
        deserialize: Some(deserialize_f64),
        runtime_hash: None,
    });
    let slot = system.resource_slot(ResourceDesc {
        computation: comp,
        args: vec![],
        is_volatile: false,
        is_persisted: false,
        deserialize: Some(deserialize_f64),
    });
    Handle::from_slot(slot)
}

/// Defines a literal `f64` resource whose identity is derived from the
/// value bits, so the same literal names the same resource across systems
/// and processes (unlike [`constant_f64`], whose identity is anonymous).
/// Literals are persisted.
pub fn literal_f64(system: &Arc<ResourceSystem>, value: f64) -> Handle<f64> {
    let mut mixer = HashMixer::new();
    mixer.add_hash(make_algo_hash("demo/arith/lit", 1));
    mixer.add_u64(value.to_bits());
    let comp = system.define_computation(ComputationDesc {
        algo_hash: mixer.finish(),
        type_hash: make_type_hash("f64"),
        compute: Arc::new(move |_args| ComputationResult::from_serialized(encode_f64(value))),
        deserialize: Some(deserialize_f64),
        runtime_hash: None,
    });
    let slot = system.resource_slot(ResourceDesc {
        computation: comp,
        args: vec![],
        is_volatile: false,
        is_persisted: true,
        deserialize: Some(deserialize_f64),
    });
    Handle::from_slot(slot)
}

/// Defines `lhs + rhs` as a persisted resource and returns a typed handle.
pub fn add(system: &Arc<ResourceSystem>, lhs: &Handle<f64>, rhs: &Handle<f64>) -> Handle<f64> {
    let comp = add_computation(system);
    let slot = system.resource_slot(ResourceDesc {
        computation: comp,
        args: vec![lhs.hash(), rhs.hash()],
        is_volatile: false,
        is_persisted: true,
        deserialize: Some(deserialize_f64),
    });
    Handle::from_slot(slot)
}

/// Defines a volatile resource mirroring a shared integer cell.
///
/// The cell can be mutated from anywhere; the resource picks the new value
/// up after the next [`ResourceSystem::invalidate_volatile`]. Each watcher
/// gets an anonymous identity, so independent cells never alias.
pub fn watch_i64(system: &Arc<ResourceSystem>, cell: Arc<AtomicI64>) -> Handle<i64> {
    let comp = system.define_computation(ComputationDesc {
        algo_hash: make_unique_hash(),
        type_hash: make_type_hash("i64"),
        compute: Arc::new(move |_args| {
            ComputationResult::from_serialized(encode_i64(cell.load(Ordering::Acquire)))
        }),
        deserialize: Some(deserialize_i64),
        runtime_hash: None,
    });
    let slot = system.resource_slot(ResourceDesc {
        computation: comp,
        args: vec![],
        is_volatile: true,
        is_persisted: false,
        deserialize: Some(deserialize_i64),
    });
    Handle::from_slot(slot)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]

    use super::*;

    #[test]
    fn f64_payload_round_trips() {
        let bytes = encode_f64(2.5);
        assert_eq!(decode_f64(&bytes), Some(2.5));
        assert_eq!(decode_f64(&bytes[1..]), None);
    }

    #[test]
    fn constants_resolve_after_processing() {
        let system = ResourceSystem::new();
        let seven = constant_f64(&system, 7.0);

        assert!(seven.try_get().is_none());
        system.process_all();
        assert_eq!(*seven.try_get().unwrap(), 7.0);
        assert!(seven.is_loaded());
    }

    #[test]
    fn distinct_constants_get_distinct_resources() {
        let system = ResourceSystem::new();
        let a = constant_f64(&system, 1.0);
        let b = constant_f64(&system, 1.0);
        // captured by value under anonymous algo hashes: no aliasing
        assert_ne!(a.hash(), b.hash());
    }
}
