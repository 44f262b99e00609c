// SPDX-License-Identifier: Apache-2.0
//! File-backed volatile resources and the hot-reload watcher.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use resin_core::{
    make_algo_hash, make_type_hash, ComputationDesc, ComputationResult, Handle, HashMixer,
    ResourceDesc, ResourceError, ResourceSystem, RuntimeValue,
};

// Cheap change fingerprint per watched file. Modification time alone has
// coarse granularity on some filesystems, so the length is folded in too.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn probe(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

fn deserialize_bytes(bytes: &[u8]) -> RuntimeValue {
    Arc::new(Bytes::copy_from_slice(bytes))
}

fn deserialize_text(bytes: &[u8]) -> RuntimeValue {
    Arc::new(String::from_utf8_lossy(bytes).into_owned())
}

/// Defines file resources and watches them for changes.
///
/// Every file loaded through a `FileSource` (while hot reloading is
/// enabled) is registered for watching. A call to
/// [`check_hot_reloading`](Self::check_hot_reloading) compares on-disk
/// fingerprints against the last loaded state and bumps the engine's
/// generation counter when anything changed; the affected file resources
/// then reload lazily on their next request.
pub struct FileSource {
    hot_reload: AtomicBool,
    // None means the last probe failed (file deleted); a change in either
    // direction fires exactly once.
    watches: Mutex<BTreeMap<PathBuf, Option<FileStamp>>>,
    weak_self: Weak<FileSource>,
}

impl FileSource {
    /// Creates a file source with hot reloading enabled.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            hot_reload: AtomicBool::new(true),
            watches: Mutex::new(BTreeMap::new()),
            weak_self: weak.clone(),
        })
    }

    /// Enables or disables watch registration. Only applies to files loaded
    /// after this call; existing watches keep firing.
    pub fn set_hot_reloading(&self, enabled: bool) {
        self.hot_reload.store(enabled, Ordering::Release);
    }

    /// Defines a volatile resource producing the raw bytes of `path`.
    ///
    /// The resource identity is derived from the path, so the same path
    /// names the same resource in every system and process. A missing file
    /// is error content, not a panic: dependents observe it like any other
    /// failed input.
    pub fn file(&self, system: &ResourceSystem, path: impl Into<PathBuf>) -> Handle<Bytes> {
        let slot = self.define_file_slot(system, path.into(), "binary");
        Handle::from_slot(slot)
    }

    /// Defines a volatile resource producing the text of `path` (lossily
    /// decoded as UTF-8).
    pub fn text_file(&self, system: &ResourceSystem, path: impl Into<PathBuf>) -> Handle<String> {
        let slot = self.define_file_slot(system, path.into(), "text");
        Handle::from_slot(slot)
    }

    /// Checks all watched files and invalidates the engine's volatile
    /// resources if any changed since they were last loaded.
    ///
    /// Call this from a polling loop or an OS watcher callback; the
    /// invalidation itself is O(1) and reloads happen lazily.
    pub fn check_hot_reloading(&self, system: &ResourceSystem) {
        let mut changed = false;
        {
            let mut watches = self.watches.lock();
            for (path, stamp) in watches.iter_mut() {
                let current = FileStamp::probe(path);
                if current != *stamp {
                    debug!(path = %path.display(), "file changed, invalidating");
                    *stamp = current;
                    changed = true;
                }
            }
        }
        if changed {
            system.invalidate_volatile();
        }
    }

    /// Number of files currently being watched.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.watches.lock().len()
    }

    fn define_file_slot(
        &self,
        system: &ResourceSystem,
        path: PathBuf,
        flavor: &'static str,
    ) -> Arc<resin_core::ResourceSlot> {
        let mut mixer = HashMixer::new();
        mixer.add_hash(make_algo_hash("fs/file", 1));
        mixer.add_str(flavor);
        mixer.add_bytes(path.as_os_str().as_encoded_bytes());

        let source = self.weak_self.clone();
        let compute_path = path.clone();
        let comp = system.define_computation(ComputationDesc {
            algo_hash: mixer.finish(),
            type_hash: make_type_hash(flavor),
            compute: Arc::new(move |_args| {
                if let Some(source) = source.upgrade() {
                    source.watch(&compute_path);
                }
                match std::fs::read(&compute_path) {
                    Ok(bytes) => ComputationResult::from_serialized(Bytes::from(bytes)),
                    Err(error) => {
                        warn!(path = %compute_path.display(), "file read failed: {error}");
                        ResourceError::from_user(format!(
                            "file '{}' does not exist or is unreadable",
                            compute_path.display()
                        ))
                        .into()
                    }
                }
            }),
            deserialize: None,
            runtime_hash: None,
        });

        system.resource_slot(ResourceDesc {
            computation: comp,
            args: vec![],
            is_volatile: true,
            is_persisted: false,
            deserialize: Some(if flavor == "text" {
                deserialize_text
            } else {
                deserialize_bytes
            }),
        })
    }

    // Snapshot the file fingerprint at load time so later checks compare
    // against what was actually read.
    fn watch(&self, path: &Path) {
        if !self.hot_reload.load(Ordering::Acquire) {
            return;
        }
        if let Some(stamp) = FileStamp::probe(path) {
            self.watches.lock().insert(path.to_path_buf(), Some(stamp));
        }
    }
}
