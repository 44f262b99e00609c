#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use resin_core::demo::arith::{decode_f64, deserialize_f64, encode_f64};
use resin_core::{
    make_algo_hash, make_type_hash, CompHash, ComputationDesc, ComputationResult, ContentRef,
    ResHash, ResourceDesc, ResourceSystem,
};

/// Defines an f64 sum computation that counts how often it actually runs.
///
/// Counters are per system instance; the algo name keeps the identity
/// deterministic across systems while each system carries its own closure.
pub fn counting_add_computation(
    system: &ResourceSystem,
    name: &str,
) -> (CompHash, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let comp = system.define_computation(ComputationDesc {
        algo_hash: make_algo_hash(name, 1),
        type_hash: make_type_hash("f64"),
        compute: Arc::new(move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            sum_f64(args)
        }),
        deserialize: Some(deserialize_f64),
        runtime_hash: None,
    });
    (comp, calls)
}

/// Defines an f64 identity computation that counts how often it runs.
pub fn counting_identity_computation(
    system: &ResourceSystem,
    name: &str,
) -> (CompHash, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let comp = system.define_computation(ComputationDesc {
        algo_hash: make_algo_hash(name, 1),
        type_hash: make_type_hash("f64"),
        compute: Arc::new(move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            match args.first().and_then(|arg| arg.downcast_ref::<f64>()) {
                Some(value) => ComputationResult::from_serialized(encode_f64(*value)),
                None => ComputationResult::from_error("argument is not an f64"),
            }
        }),
        deserialize: Some(deserialize_f64),
        runtime_hash: None,
    });
    (comp, calls)
}

fn sum_f64(args: &[ContentRef]) -> ComputationResult {
    if args.iter().any(ContentRef::has_error) {
        return ComputationResult::from_error("at least one dependency had an error");
    }
    let mut sum = 0.0f64;
    for arg in args {
        match arg.downcast_ref::<f64>() {
            Some(value) => sum += value,
            None => return ComputationResult::from_error("argument is not an f64"),
        }
    }
    ComputationResult::from_serialized(encode_f64(sum))
}

/// Defines a non-volatile resource over `comp`.
pub fn resource(
    system: &ResourceSystem,
    comp: CompHash,
    args: Vec<ResHash>,
    is_persisted: bool,
) -> ResHash {
    system
        .define_resource(ResourceDesc {
            computation: comp,
            args,
            is_volatile: false,
            is_persisted,
            deserialize: Some(deserialize_f64),
        })
        .0
}

/// Reads a resource's current f64 value from its serialized content.
pub fn value_of(system: &ResourceSystem, res: ResHash) -> Option<f64> {
    let content = system.try_get_resource_content(res, true)?;
    decode_f64(content.serialized.as_deref()?)
}
