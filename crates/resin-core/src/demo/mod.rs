// SPDX-License-Identifier: Apache-2.0
//! Demo computations showcasing the engine (used by tests and docs).

pub mod arith;
