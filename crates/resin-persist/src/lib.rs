// SPDX-License-Identifier: Apache-2.0
//! resin-persist: a simple durable store for the resource graph engine.
//!
//! Two of the engine's four stores persist meaningfully:
//!
//! - the invocation store (`InvocHash` → `ContentHash`): many small entries,
//! - the content store (`ContentHash` → bytes or error): fewer, larger ones.
//!
//! This crate is a deliberately simple consumer of the engine's persistence
//! bridge: it loads both stores from two flat files, registers itself as a
//! content provider for lazy content lookups, and snapshots newly persisted
//! state back to disk on [`SimpleStore::save`]. No compression, no
//! integrity promises beyond a magic/version header.
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

mod simple;

pub use simple::{PersistConfig, PersistError, SimpleStore};
