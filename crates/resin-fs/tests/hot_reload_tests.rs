#![allow(missing_docs)]
//! File resources end to end: load, change, invalidate, reload.

use bytes::Bytes;
use resin_core::ResourceSystem;
use resin_fs::FileSource;

#[test]
fn files_load_as_byte_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data.bin");
    std::fs::write(&path, b"payload").expect("write");

    let system = ResourceSystem::new();
    let source = FileSource::new();
    let file = source.file(&system, &path);

    file.try_get();
    system.process_all();

    let bytes = file.try_get().expect("loaded");
    assert_eq!(bytes.as_ref(), &Bytes::from_static(b"payload"));
    assert_eq!(source.watched_count(), 1);
}

#[test]
fn text_files_decode_to_strings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("note.txt");
    std::fs::write(&path, "hello").expect("write");

    let system = ResourceSystem::new();
    let source = FileSource::new();
    let text = source.text_file(&system, &path);

    text.try_get();
    system.process_all();
    assert_eq!(*text.try_get().expect("loaded"), "hello");
}

#[test]
fn missing_files_become_error_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.bin");

    let system = ResourceSystem::new();
    let source = FileSource::new();
    let file = source.file(&system, &path);

    file.try_get();
    system.process_all();

    let content = file.try_get_content().expect("error content");
    assert!(content.has_error());
    assert!(file.try_get().is_none());
    assert_eq!(source.watched_count(), 0);
}

#[test]
fn changed_files_reload_after_invalidation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data.txt");
    std::fs::write(&path, "first").expect("write");

    let system = ResourceSystem::new();
    let source = FileSource::new();
    let text = source.text_file(&system, &path);

    text.try_get();
    system.process_all();
    assert_eq!(*text.try_get().expect("initial"), "first");

    // a different length guarantees the stamp comparison fires even on
    // filesystems with coarse mtime granularity
    std::fs::write(&path, "second, longer").expect("rewrite");

    // nothing happens until the watcher runs
    assert_eq!(*text.try_get().expect("still cached"), "first");

    let before = system.generation();
    source.check_hot_reloading(&system);
    assert!(system.generation() > before);

    text.try_get();
    system.process_all();
    assert_eq!(*text.try_get().expect("reloaded"), "second, longer");

    // no further change: the watcher stays quiet
    let settled = system.generation();
    source.check_hot_reloading(&system);
    assert_eq!(system.generation(), settled);
}

#[test]
fn disabled_hot_reloading_registers_no_watches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data.bin");
    std::fs::write(&path, b"x").expect("write");

    let system = ResourceSystem::new();
    let source = FileSource::new();
    source.set_hot_reloading(false);

    let file = source.file(&system, &path);
    file.try_get();
    system.process_all();

    assert!(file.try_get().is_some());
    assert_eq!(source.watched_count(), 0);
}

#[test]
fn the_same_path_names_the_same_resource() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data.bin");
    std::fs::write(&path, b"x").expect("write");

    let system = ResourceSystem::new();
    let source = FileSource::new();
    let a = source.file(&system, &path);
    let b = source.file(&system, &path);
    assert_eq!(a.hash(), b.hash());

    // binary and text views are distinct resources
    let t = source.text_file(&system, &path);
    assert_ne!(a.hash(), t.hash());
}
