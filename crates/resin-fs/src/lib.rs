// SPDX-License-Identifier: Apache-2.0
//! resin-fs: file resources with hot reloading.
//!
//! Files are the canonical volatile input: their content can change at any
//! time, but the engine only observes changes when the generation counter
//! advances. This crate models a file as a volatile resource whose
//! computation reads the bytes from disk, and pairs it with a watcher that
//! detects on-disk changes and triggers the engine's O(1) invalidation.
//!
//! The engine core performs no filesystem I/O itself; this adapter drives it
//! purely through public operations (`define_computation`,
//! `define_resource`, `invalidate_volatile`).
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
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod file;

pub use file::FileSource;
