// SPDX-License-Identifier: Apache-2.0
//! File-backed persistence of the invocation and content stores.
//!
//! File layout under the base directory:
//!
//! - `invocs.bin` — magic, entry count, then `(invoc hash, content hash)`
//!   pairs (16 bytes each);
//! - `contents.bin` — magic, entry count, then
//!   `(content hash, kind, length, bytes)` records, where kind 1 is a
//!   serialized blob and kind 2 a UTF-8 error message.
//!
//! All integers are little-endian. Entries are written in hash order so a
//! save of identical state produces identical files.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use resin_core::{ComputationResult, ContentHash, Hash128, InvocHash, ResourceSystem};

const INVOC_MAGIC: &[u8; 8] = b"RSNINVC1";
const CONTENT_MAGIC: &[u8; 8] = b"RSNCONT1";

const KIND_SERIALIZED: u8 = 1;
const KIND_ERROR: u8 = 2;

/// Errors reported by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistError {
    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A store file exists but does not parse.
    #[error("malformed store file: {0}")]
    Format(&'static str),
}

/// Tuning knobs for [`SimpleStore`].
#[derive(Debug, Clone, Copy)]
pub struct PersistConfig {
    /// Soft cap on persisted invocation mappings; exceeding it logs a
    /// warning (no eviction is performed).
    pub max_invoc_count: usize,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            max_invoc_count: 1 << 20,
        }
    }
}

// One persistable content record: either serialized bytes or an error
// message (runtime-only content never reaches this crate).
enum StoredContent {
    Serialized(Bytes),
    Error(String),
}

impl StoredContent {
    fn to_result(&self) -> ComputationResult {
        match self {
            Self::Serialized(blob) => ComputationResult::from_serialized(blob.clone()),
            Self::Error(message) => ComputationResult::from_error(message.clone()),
        }
    }
}

#[derive(Default)]
struct State {
    invocs: BTreeMap<InvocHash, ContentHash>,
    contents: BTreeMap<ContentHash, StoredContent>,
}

/// Very simple file-based persistent store.
///
/// Typical use: [`load`](Self::load) once at startup,
/// [`attach`](Self::attach) as a content provider, and
/// [`save`](Self::save) whenever a snapshot is wanted.
pub struct SimpleStore {
    base_dir: PathBuf,
    config: PersistConfig,
    state: Mutex<State>,
    weak_self: Weak<SimpleStore>,
}

impl SimpleStore {
    /// Creates a store rooted at `base_dir`. Nothing is read or written
    /// until [`load`](Self::load) or [`save`](Self::save). `Arc`-owned so
    /// the store can hand itself to the engine as a content provider.
    pub fn new(base_dir: impl Into<PathBuf>, config: PersistConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            base_dir: base_dir.into(),
            config,
            state: Mutex::new(State::default()),
            weak_self: weak.clone(),
        })
    }

    fn invoc_path(&self) -> PathBuf {
        self.base_dir.join("invocs.bin")
    }

    fn content_path(&self) -> PathBuf {
        self.base_dir.join("contents.bin")
    }

    /// Loads the store files and injects all invocation mappings into
    /// `system`. Content records stay local and are served through
    /// [`try_get_content`](Self::try_get_content).
    ///
    /// Returns `Ok(false)` if no store exists yet at the base directory.
    ///
    /// # Errors
    ///
    /// I/O failures and malformed files.
    pub fn load(&self, system: &ResourceSystem) -> Result<bool, PersistError> {
        let invoc_file = match File::open(self.invoc_path()) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error.into()),
        };

        let mut state = self.state.lock();
        state.invocs = read_invocs(BufReader::new(invoc_file))?;

        match File::open(self.content_path()) {
            Ok(file) => state.contents = read_contents(BufReader::new(file))?,
            Err(error) if error.kind() == ErrorKind::NotFound => state.contents.clear(),
            Err(error) => return Err(error.into()),
        }

        let pairs: Vec<_> = state
            .invocs
            .iter()
            .map(|(invoc, content)| (*invoc, *content))
            .collect();
        system.inject_invoc_cache(&pairs);

        debug!(
            invocs = state.invocs.len(),
            contents = state.contents.len(),
            "persistent store loaded"
        );
        Ok(true)
    }

    /// Registers this store as a content provider on `system`.
    pub fn attach(&self, system: &ResourceSystem) {
        let Some(store) = self.weak_self.upgrade() else {
            return;
        };
        system.inject_content_provider(Box::new(move |hash| store.try_get_content(hash)));
    }

    /// Looks up missing content on behalf of the engine.
    pub fn try_get_content(&self, hash: ContentHash) -> Option<ComputationResult> {
        self.state
            .lock()
            .contents
            .get(&hash)
            .map(StoredContent::to_result)
    }

    /// Snapshots every persistable invocation and content record of
    /// `system` not yet on disk, then rewrites the store files.
    ///
    /// # Errors
    ///
    /// I/O failures. The in-memory index keeps the new entries even if the
    /// write fails, so a later save retries them.
    pub fn save(&self, system: &ResourceSystem) -> Result<(), PersistError> {
        let mut state = self.state.lock();

        let known: HashSet<InvocHash> = state.invocs.keys().copied().collect();
        let fresh = system.collect_all_persistent_invocations(&known);
        let missing_contents: Vec<ContentHash> = fresh
            .iter()
            .map(|(_, content)| *content)
            .filter(|content| !state.contents.contains_key(content))
            .collect();

        for (invoc, content) in fresh {
            state.invocs.insert(invoc, content);
        }
        for content in system.collect_all_persistent_content(&missing_contents) {
            let stored = if let Some(error) = &content.error {
                StoredContent::Error(error.to_string())
            } else if let Some(blob) = &content.serialized {
                StoredContent::Serialized(blob.clone())
            } else {
                // collect_all_persistent_content only yields serializable refs
                continue;
            };
            state.contents.insert(content.hash, stored);
        }

        if state.invocs.len() > self.config.max_invoc_count {
            warn!(
                count = state.invocs.len(),
                cap = self.config.max_invoc_count,
                "persisted invocation count exceeds the configured cap"
            );
        }

        std::fs::create_dir_all(&self.base_dir)?;
        write_invocs(
            BufWriter::new(File::create(self.invoc_path())?),
            &state.invocs,
        )?;
        write_contents(
            BufWriter::new(File::create(self.content_path())?),
            &state.contents,
        )?;

        debug!(
            invocs = state.invocs.len(),
            contents = state.contents.len(),
            "persistent store saved"
        );
        Ok(())
    }
}

fn read_exact_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N], PersistError> {
    let mut buffer = [0u8; N];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

fn read_u64(reader: &mut impl Read) -> Result<u64, PersistError> {
    Ok(u64::from_le_bytes(read_exact_array(reader)?))
}

fn read_len(reader: &mut impl Read) -> Result<usize, PersistError> {
    usize::try_from(read_u64(reader)?).map_err(|_| PersistError::Format("length overflow"))
}

fn read_hash(reader: &mut impl Read) -> Result<Hash128, PersistError> {
    Ok(Hash128(read_exact_array(reader)?))
}

fn write_u64(writer: &mut impl Write, value: u64) -> Result<(), PersistError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_len(writer: &mut impl Write, len: usize) -> Result<(), PersistError> {
    write_u64(
        writer,
        u64::try_from(len).map_err(|_| PersistError::Format("length overflow"))?,
    )
}

fn read_invocs(mut reader: impl Read) -> Result<BTreeMap<InvocHash, ContentHash>, PersistError> {
    if &read_exact_array::<8>(&mut reader)? != INVOC_MAGIC {
        return Err(PersistError::Format("bad invocation file magic"));
    }
    let count = read_len(&mut reader)?;
    let mut invocs = BTreeMap::new();
    for _ in 0..count {
        let invoc = InvocHash(read_hash(&mut reader)?);
        let content = ContentHash(read_hash(&mut reader)?);
        invocs.insert(invoc, content);
    }
    Ok(invocs)
}

fn write_invocs(
    mut writer: impl Write,
    invocs: &BTreeMap<InvocHash, ContentHash>,
) -> Result<(), PersistError> {
    writer.write_all(INVOC_MAGIC)?;
    write_len(&mut writer, invocs.len())?;
    for (invoc, content) in invocs {
        writer.write_all(invoc.as_bytes())?;
        writer.write_all(content.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn read_contents(
    mut reader: impl Read,
) -> Result<BTreeMap<ContentHash, StoredContent>, PersistError> {
    if &read_exact_array::<8>(&mut reader)? != CONTENT_MAGIC {
        return Err(PersistError::Format("bad content file magic"));
    }
    let count = read_len(&mut reader)?;
    let mut contents = BTreeMap::new();
    for _ in 0..count {
        let hash = ContentHash(read_hash(&mut reader)?);
        let kind = read_exact_array::<1>(&mut reader)?[0];
        let len = read_len(&mut reader)?;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        let stored = match kind {
            KIND_SERIALIZED => StoredContent::Serialized(Bytes::from(payload)),
            KIND_ERROR => StoredContent::Error(
                String::from_utf8(payload)
                    .map_err(|_| PersistError::Format("error message is not utf-8"))?,
            ),
            _ => return Err(PersistError::Format("unknown content kind")),
        };
        contents.insert(hash, stored);
    }
    Ok(contents)
}

fn write_contents(
    mut writer: impl Write,
    contents: &BTreeMap<ContentHash, StoredContent>,
) -> Result<(), PersistError> {
    writer.write_all(CONTENT_MAGIC)?;
    write_len(&mut writer, contents.len())?;
    for (hash, stored) in contents {
        writer.write_all(hash.as_bytes())?;
        let (kind, payload): (u8, &[u8]) = match stored {
            StoredContent::Serialized(blob) => (KIND_SERIALIZED, blob),
            StoredContent::Error(message) => (KIND_ERROR, message.as_bytes()),
        };
        writer.write_all(&[kind])?;
        write_len(&mut writer, payload.len())?;
        writer.write_all(payload)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn unloaded_store_serves_nothing() {
        let store = SimpleStore::new("/nonexistent", PersistConfig::default());
        let hash = ContentHash(Hash128([1; 16]));
        assert!(store.try_get_content(hash).is_none());
    }

    #[test]
    fn invoc_framing_round_trips() {
        let mut invocs = BTreeMap::new();
        invocs.insert(InvocHash(Hash128([1; 16])), ContentHash(Hash128([2; 16])));
        invocs.insert(InvocHash(Hash128([3; 16])), ContentHash(Hash128([4; 16])));

        let mut buffer = Vec::new();
        write_invocs(&mut buffer, &invocs).unwrap();
        let decoded = read_invocs(buffer.as_slice()).unwrap();
        assert_eq!(decoded, invocs);
    }

    #[test]
    fn content_framing_round_trips_both_kinds() {
        let mut contents = BTreeMap::new();
        contents.insert(
            ContentHash(Hash128([1; 16])),
            StoredContent::Serialized(Bytes::from_static(b"payload")),
        );
        contents.insert(
            ContentHash(Hash128([2; 16])),
            StoredContent::Error("boom".to_owned()),
        );

        let mut buffer = Vec::new();
        write_contents(&mut buffer, &contents).unwrap();
        let decoded = read_contents(buffer.as_slice()).unwrap();
        assert_eq!(decoded.len(), 2);
        match decoded.get(&ContentHash(Hash128([1; 16]))).unwrap() {
            StoredContent::Serialized(blob) => assert_eq!(blob.as_ref(), b"payload"),
            StoredContent::Error(_) => unreachable!("wrong kind"),
        }
        match decoded.get(&ContentHash(Hash128([2; 16]))).unwrap() {
            StoredContent::Error(message) => assert_eq!(message, "boom"),
            StoredContent::Serialized(_) => unreachable!("wrong kind"),
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let result = read_invocs(b"NOTMAGIC\0\0\0\0\0\0\0\0".as_slice());
        assert!(matches!(result, Err(PersistError::Format(_))));
    }
}
