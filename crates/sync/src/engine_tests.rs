// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::object::{MemoryObjectStore, ObjectStore};
use filetime_bump::bump_mtime;

fn setup() -> (Arc<MemoryObjectStore>, SyncEngine, tempfile::TempDir) {
    setup_with(SyncConfig::default())
}

fn setup_with(config: SyncConfig) -> (Arc<MemoryObjectStore>, SyncEngine, tempfile::TempDir) {
    let inner = Arc::new(MemoryObjectStore::new());
    let scoped = ScopedStore::new(Arc::clone(&inner) as Arc<dyn ObjectStore>, "bucket", "u1/p1");
    let engine = SyncEngine::new(scoped, config, Arc::new(SyncGate::new()));
    (inner, engine, tempfile::tempdir().unwrap())
}

/// mtime granularity on some filesystems is a full second; nudge the clock
/// forward explicitly so a rewrite is always detected as a change.
mod filetime_bump {
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    pub fn bump_mtime(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(2);
        let file = std::fs::File::options().append(true).open(path).unwrap();
        file.set_modified(later).unwrap();
    }
}

#[tokio::test]
async fn downloads_new_remote_objects() {
    let (inner, engine, dir) = setup();
    inner.seed("bucket", "u1/p1/a.txt", "alpha");
    inner.seed("bucket", "u1/p1/sub/b.txt", "beta");
    inner.seed("bucket", "u1/p1/dir/", ""); // folder placeholder

    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats, SyncStats { scanned_remote: 2, downloaded: 2, uploaded: 0, conflicts: 0 });
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha");
    assert_eq!(std::fs::read_to_string(dir.path().join("sub/b.txt")).unwrap(), "beta");
}

#[tokio::test]
async fn sync_twice_with_no_changes_is_idempotent() {
    let (inner, engine, dir) = setup();
    inner.seed("bucket", "u1/p1/a.txt", "alpha");

    engine.sync(dir.path()).await.unwrap().unwrap();
    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats, SyncStats { scanned_remote: 1, downloaded: 0, uploaded: 0, conflicts: 0 });
}

#[tokio::test]
async fn uploads_new_local_files() {
    let (inner, engine, dir) = setup();
    std::fs::create_dir_all(dir.path().join("notes")).unwrap();
    std::fs::write(dir.path().join("notes/a.txt"), "hello").unwrap();

    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats.uploaded, 1);
    assert_eq!(stats.conflicts, 0);
    assert_eq!(inner.content("bucket", "u1/p1/notes/a.txt"), Some(bytes::Bytes::from("hello")));
}

#[tokio::test]
async fn uploads_local_edits_conditionally() {
    let (inner, engine, dir) = setup();
    inner.seed("bucket", "u1/p1/a.txt", "v1");
    engine.sync(dir.path()).await.unwrap().unwrap();

    std::fs::write(dir.path().join("a.txt"), "v2 longer").unwrap();
    bump_mtime(&dir.path().join("a.txt"));
    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats.uploaded, 1);
    assert_eq!(inner.content("bucket", "u1/p1/a.txt"), Some(bytes::Bytes::from("v2 longer")));
}

#[tokio::test]
async fn remote_drift_with_local_edit_is_a_conflict_and_remote_wins() {
    let (inner, engine, dir) = setup();
    inner.seed("bucket", "u1/p1/foo.txt", "original");
    engine.sync(dir.path()).await.unwrap().unwrap();

    // Remote moves on while the local copy is edited.
    inner.seed("bucket", "u1/p1/foo.txt", "remote v2");
    std::fs::write(dir.path().join("foo.txt"), "local edit").unwrap();
    bump_mtime(&dir.path().join("foo.txt"));

    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.uploaded, 0);
    assert_eq!(stats.conflicts, 1);
    assert_eq!(std::fs::read_to_string(dir.path().join("foo.txt")).unwrap(), "remote v2");
}

#[tokio::test]
async fn new_local_file_shadowing_remote_is_a_conflict() {
    let (inner, engine, dir) = setup();
    inner.seed("bucket", "u1/p1/a.txt", "remote");
    // Local file exists before the first sync ever recorded the object.
    std::fs::write(dir.path().join("a.txt"), "local").unwrap();

    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    // The remote version is downloaded over the never-synced local copy.
    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.uploaded, 0);
}

#[tokio::test]
async fn upload_disabled_skips_upload_pass() {
    let (inner, engine, dir) = setup_with(SyncConfig { enable_upload: false, ..Default::default() });
    std::fs::write(dir.path().join("a.txt"), "local").unwrap();

    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats.uploaded, 0);
    assert!(inner.content("bucket", "u1/p1/a.txt").is_none());
}

#[tokio::test]
async fn denied_create_counts_as_conflict_without_failing_others() {
    let inner = Arc::new(MemoryObjectStore::new());
    let g1 = inner.seed("bucket", "u1/p1/existing.txt", "v1");
    let scoped = ScopedStore::new(Arc::clone(&inner) as Arc<dyn ObjectStore>, "bucket", "u1/p1")
        .without_create();
    let engine = SyncEngine::new(scoped, SyncConfig::default(), Arc::new(SyncGate::new()));
    let dir = tempfile::tempdir().unwrap();

    engine.sync(dir.path()).await.unwrap().unwrap();
    std::fs::write(dir.path().join("existing.txt"), "v2 edit").unwrap();
    bump_mtime(&dir.path().join("existing.txt"));
    std::fs::write(dir.path().join("brand-new.txt"), "nope").unwrap();

    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats.uploaded, 1); // the update went through
    assert_eq!(stats.conflicts, 1); // the denied create did not
    let (_, g2) = inner.download("bucket", "u1/p1/existing.txt").await.unwrap();
    assert_ne!(g2, g1);
}

#[tokio::test]
async fn manifest_corruption_triggers_redownload() {
    let (inner, engine, dir) = setup();
    inner.seed("bucket", "u1/p1/a.txt", "alpha");
    engine.sync(dir.path()).await.unwrap().unwrap();

    std::fs::write(dir.path().join(MANIFEST_NAME), "{broken").unwrap();
    let stats = engine.sync(dir.path()).await.unwrap().unwrap();
    assert_eq!(stats.downloaded, 1);
}

#[test]
fn gate_serializes_and_coalesces_per_root() {
    let gate = SyncGate::new();
    let root = std::path::Path::new("/mnt/work/p1");
    let other = std::path::Path::new("/mnt/work/p2");

    assert!(gate.begin(root));
    // A second trigger while running coalesces…
    assert!(!gate.begin(root));
    assert!(!gate.begin(root));
    // …and an unrelated root is unaffected.
    assert!(gate.begin(other));

    // The running task owes exactly one follow-up pass.
    assert!(gate.finish(root));
    assert!(!gate.finish(root));
    assert!(gate.begin(root));
    assert!(!gate.finish(root));
}

#[tokio::test]
async fn manifest_itself_is_never_mirrored() {
    let (inner, engine, dir) = setup();
    std::fs::write(dir.path().join("a.txt"), "x").unwrap();
    engine.sync(dir.path()).await.unwrap().unwrap();
    assert!(inner.content("bucket", &format!("u1/p1/{}", MANIFEST_NAME)).is_none());
}
