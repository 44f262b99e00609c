// SPDX-License-Identifier: Apache-2.0
//! Identifier and hashing utilities.
//!
//! Every identity in the engine is a 128-bit hash: the first 16 bytes of a
//! domain-separated SHA-1 digest. With 10^10 objects in a store this gives a
//! collision probability around 10^-18 (birthday bound), which is treated as
//! "never" — see the collision assertions in the resource store.
//!
//! Each hash kind gets its own nominal wrapper so a computation identity can
//! never be passed where a content identity is expected.

use std::hash::{Hash as _, Hasher as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};

/// Canonical 128-bit hash value underlying all engine identities.
///
/// The inner bytes are public for zero-cost access; `Display` renders
/// lowercase hex for logging and error messages.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Hash128(pub [u8; 16]);

impl Hash128 {
    /// Returns the canonical byte representation of this hash.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short bracketed hex form (first 4 bytes) for log lines.
    #[must_use]
    pub fn short(&self) -> ShortHash {
        ShortHash([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl std::fmt::Display for Hash128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Abbreviated display adapter produced by [`Hash128::short`].
#[derive(Clone, Copy, Debug)]
pub struct ShortHash([u8; 4]);

impl std::fmt::Display for ShortHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "]")
    }
}

macro_rules! hash_wrapper {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
        pub struct $name(pub Hash128);

        impl $name {
            /// Returns the canonical byte representation of this identity.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Short bracketed hex form (first 4 bytes) for log lines.
            #[must_use]
            pub fn short(&self) -> ShortHash {
                self.0.short()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

hash_wrapper! {
    /// Identity of a computation: algorithm hash plus argument-type hash.
    ///
    /// Produced by [`make_comp_hash`]. Two computations with the same
    /// `CompHash` are interchangeable; the computation store rejects nothing
    /// but warns on inconsistent redefinition.
    CompHash
}

hash_wrapper! {
    /// Identity of a resource: its computation plus the identities of its
    /// input resources. This is the "resource name" the whole engine is
    /// keyed by. Produced by [`make_res_hash`].
    ResHash
}

hash_wrapper! {
    /// Identity of computed content bytes (or of an error message, or of a
    /// runtime-only value). Produced by `make_content_hash` in the content
    /// module.
    ContentHash
}

hash_wrapper! {
    /// Identity of one specific invocation: computation plus the content
    /// hashes of all arguments. For non-volatile resources this
    /// deterministically names the resulting content. Produced by
    /// [`make_invoc_hash`].
    InvocHash
}

hash_wrapper! {
    /// Identity of a runtime-representation type, derived from a stable type
    /// name via [`make_type_hash`]. Differentiates instantiations of generic
    /// computations.
    TypeHash
}

/// Incremental domain-separated hash builder.
///
/// Wraps SHA-1 as a mixer and truncates to 128 bits on
/// [`finish`](Self::finish). Fields are fed in a fixed order with explicit
/// little-endian integer encodings, so every hash construction site doubles
/// as its own wire format definition.
pub struct HashMixer {
    sha: Sha1,
}

impl HashMixer {
    /// Creates an empty mixer.
    #[must_use]
    pub fn new() -> Self {
        Self { sha: Sha1::new() }
    }

    /// Feeds raw bytes.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.sha.update(bytes);
    }

    /// Feeds a `u32` (little-endian).
    pub fn add_u32(&mut self, value: u32) {
        self.sha.update(value.to_le_bytes());
    }

    /// Feeds a `u64` (little-endian).
    pub fn add_u64(&mut self, value: u64) {
        self.sha.update(value.to_le_bytes());
    }

    /// Feeds an `i32` (little-endian).
    pub fn add_i32(&mut self, value: i32) {
        self.sha.update(value.to_le_bytes());
    }

    /// Feeds an `i64` (little-endian).
    pub fn add_i64(&mut self, value: i64) {
        self.sha.update(value.to_le_bytes());
    }

    /// Feeds a string as UTF-8 bytes.
    pub fn add_str(&mut self, value: &str) {
        self.sha.update(value.as_bytes());
    }

    /// Feeds another hash value.
    pub fn add_hash(&mut self, hash: Hash128) {
        self.sha.update(hash.as_bytes());
    }

    /// Finalizes the digest, keeping the first 16 of SHA-1's 20 bytes.
    #[must_use]
    pub fn finish(self) -> Hash128 {
        let digest = self.sha.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Hash128(out)
    }
}

impl Default for HashMixer {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces the identity of a computation: `H(algo_hash || type_hash)`.
///
/// `type_hash` is `TypeHash::default()` (all zeroes) for non-generic
/// computations.
#[must_use]
pub fn make_comp_hash(algo_hash: Hash128, type_hash: TypeHash) -> CompHash {
    let mut mixer = HashMixer::new();
    mixer.add_hash(algo_hash);
    mixer.add_hash(type_hash.0);
    CompHash(mixer.finish())
}

/// Produces the identity of a resource: `H(computation || args[0] || ...)`.
#[must_use]
pub fn make_res_hash(computation: CompHash, args: &[ResHash]) -> ResHash {
    let mut mixer = HashMixer::new();
    mixer.add_hash(computation.0);
    for arg in args {
        mixer.add_hash(arg.0);
    }
    ResHash(mixer.finish())
}

/// Produces the identity of one invocation:
/// `H(computation || arg_content[0] || ...)`.
///
/// This is the invocation-cache key; it is cheap and needs no store access.
#[must_use]
pub fn make_invoc_hash(computation: CompHash, args: &[ContentHash]) -> InvocHash {
    let mut mixer = HashMixer::new();
    mixer.add_hash(computation.0);
    for arg in args {
        mixer.add_hash(arg.0);
    }
    InvocHash(mixer.finish())
}

/// Produces a stable type identity from a type name.
#[must_use]
pub fn make_type_hash(name: &str) -> TypeHash {
    let mut mixer = HashMixer::new();
    mixer.add_str(name);
    TypeHash(mixer.finish())
}

/// Produces a stable algorithm identity from a name and a version.
///
/// Bumping the version invalidates every invocation of the algorithm without
/// having to rename it.
#[must_use]
pub fn make_algo_hash(name: &str, version: i32) -> Hash128 {
    let mut mixer = HashMixer::new();
    mixer.add_u64(0x6FA2_D8E4_B7C9_0A1F);
    mixer.add_i32(version);
    mixer.add_str(name);
    mixer.finish()
}

static UNIQUE_SEED: Lazy<Mutex<Hash128>> =
    Lazy::new(|| Mutex::new(make_type_hash("globally unique random hash seed").0));
static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Produces a hash that is unique for the lifetime of the process (and, with
/// overwhelming probability, across processes).
///
/// Used for anonymous computations (constants captured by value) and for
/// per-invocation nonces of volatile, non-serializable content. Entropy is a
/// chained seed, a global counter, the calling thread id and a wall-clock
/// reading.
#[must_use]
pub fn make_unique_hash() -> Hash128 {
    let mut mixer = HashMixer::new();
    mixer.add_hash(*UNIQUE_SEED.lock());
    mixer.add_u64(UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed));
    let mut thread = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut thread);
    mixer.add_u64(thread.finish());
    mixer.add_u64(wall_clock_nanos());
    let hash = mixer.finish();
    *UNIQUE_SEED.lock() = hash;
    hash
}

/// Wall-clock nanoseconds since the Unix epoch, folded into 64 bits.
///
/// Truncation only discards high bits that repeat every ~580 years.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub(crate) fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}
