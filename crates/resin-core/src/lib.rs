// SPDX-License-Identifier: Apache-2.0
//! resin-core: content-addressed, incrementally recomputing resource graph
//! engine.
//!
//! Resources are the deterministic (or explicitly volatile) outputs of
//! computations over other resources. The whole graph is identified by
//! stable 128-bit hashes, so identical computations executed in different
//! programs, on different machines or at different times deduplicate,
//! memoize and persist.
//!
//! # Identity
//!
//! - [`CompHash`] names a computation (algorithm + argument types),
//! - [`ResHash`] names a resource (computation + input resources),
//! - [`ContentHash`] names produced bytes (or an error, or a runtime value),
//! - [`InvocHash`] names one invocation (computation + input content hashes)
//!   and keys the memoization cache.
//!
//! # Evaluation
//!
//! [`ResourceSystem::try_get_resource_content`] consults the per-resource
//! cache and enqueues missing work; [`ResourceSystem::process_all`] drains
//! the two work queues on the calling thread. Hot inputs (files, tweakable
//! parameters) are modeled as volatile resources and invalidated in O(1) by
//! [`ResourceSystem::invalidate_volatile`]; already-computed content stays
//! addressable by hash, so pure subgraphs recompute via cache hits only.
//!
//! The engine is a passive library: no threads, no I/O, no wire formats. A
//! durable layer attaches through the persistence bridge
//! ([`ResourceSystem::inject_invoc_cache`],
//! [`ResourceSystem::inject_content_provider`], and the two collect
//! operations).
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod content;
/// Demo computations showcasing the engine (used by tests and docs).
pub mod demo;
mod error;
mod handle;
mod ident;
mod slot;
mod store;
mod system;

// Re-exports for stable public API
pub use content::{
    make_content_hash, ComputationResult, ContentRef, DeserializeFn, RuntimeHashFn, RuntimeValue,
};
pub use error::{ErrorKind, ResourceError};
pub use handle::Handle;
pub use ident::{
    make_algo_hash, make_comp_hash, make_invoc_hash, make_res_hash, make_type_hash,
    make_unique_hash, CompHash, ContentHash, Hash128, HashMixer, InvocHash, ResHash, ShortHash,
    TypeHash,
};
pub use slot::{RefCount, ResourceSlot};
pub use store::MemoryStore;
pub use system::{
    ComputationDesc, ComputeFn, ContentProviderFn, ResourceDesc, ResourceSystem,
};
