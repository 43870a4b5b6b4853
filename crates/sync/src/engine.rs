// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync engine.
//!
//! One run is: list the remote prefix, download everything whose
//! generation drifted from the manifest, then upload local changes that
//! were not just overwritten — each upload conditional on the generation
//! the manifest last saw. A local edit that loses to a remote change, an
//! upload racing a remote writer, and a denied create all count as
//! conflicts; none of them fail the run.
//!
//! Runs for the same work root are serialized through a [`SyncGate`];
//! a trigger arriving mid-run marks the root dirty and the running task
//! performs one follow-up pass, so bursts of triggers coalesce.

use crate::manifest::{Manifest, ManifestEntry, MANIFEST_NAME};
use crate::object::{ObjectError, ObjectInfo, Precondition};
use crate::scoped::ScopedStore;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enable_upload: bool,
    pub download_concurrency: usize,
    pub upload_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { enable_upload: true, download_concurrency: 4, upload_concurrency: 4 }
    }
}

/// Per-run transfer counts, emitted as a `gcs_sync` stream line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub scanned_remote: usize,
    pub downloaded: usize,
    pub uploaded: usize,
    pub conflicts: usize,
}

#[derive(Default)]
struct RootState {
    running: bool,
    dirty: bool,
}

/// Serializes sync runs per work root across all streams in the process.
#[derive(Default)]
pub struct SyncGate {
    roots: Mutex<HashMap<PathBuf, RootState>>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the root. Returns false when a run is already in flight; the
    /// root is marked dirty and the running task will go again.
    fn begin(&self, root: &Path) -> bool {
        let mut roots = self.roots.lock();
        let state = roots.entry(root.to_path_buf()).or_default();
        if state.running {
            state.dirty = true;
            return false;
        }
        state.running = true;
        true
    }

    /// Release the root. Returns true when a coalesced trigger arrived and
    /// the caller should run once more (the claim is retained).
    fn finish(&self, root: &Path) -> bool {
        let mut roots = self.roots.lock();
        let Some(state) = roots.get_mut(root) else { return false };
        if state.dirty {
            state.dirty = false;
            true
        } else {
            state.running = false;
            false
        }
    }
}

pub struct SyncEngine {
    store: ScopedStore,
    config: SyncConfig,
    gate: Arc<SyncGate>,
}

impl SyncEngine {
    pub fn new(store: ScopedStore, config: SyncConfig, gate: Arc<SyncGate>) -> Self {
        Self { store, config, gate }
    }

    /// Run a sync for `work_root`. Returns `None` when an in-flight run
    /// absorbed this trigger.
    pub async fn sync(&self, work_root: &Path) -> Result<Option<SyncStats>, ObjectError> {
        if !self.gate.begin(work_root) {
            debug!(work_root = %work_root.display(), "sync coalesced into running pass");
            return Ok(None);
        }
        let mut result = self.run_once(work_root).await;
        while self.gate.finish(work_root) {
            result = self.run_once(work_root).await;
        }
        result.map(Some)
    }

    async fn run_once(&self, work_root: &Path) -> Result<SyncStats, ObjectError> {
        tokio::fs::create_dir_all(work_root)
            .await
            .map_err(|e| ObjectError::Transient(format!("work root unavailable: {}", e)))?;

        let mut manifest = Manifest::load(work_root);
        let mut stats = SyncStats::default();

        let remote: Vec<ObjectInfo> =
            self.store.list().await?.into_iter().filter(|o| !o.is_folder()).collect();
        stats.scanned_remote = remote.len();
        let remote_gens: HashMap<&str, &str> =
            remote.iter().map(|o| (o.name.as_str(), o.generation.as_str())).collect();

        // Local changes relative to the manifest, observed before any
        // download can overwrite them.
        let local_files = walk_local(work_root)
            .map_err(|e| ObjectError::Transient(format!("local walk failed: {}", e)))?;
        let changed: HashSet<&str> = local_files
            .iter()
            .filter(|f| {
                manifest
                    .get(&f.rel)
                    .is_none_or(|e| e.local_mtime != f.mtime_ms || e.local_size != f.size)
            })
            .map(|f| f.rel.as_str())
            .collect();

        // --- download pass ---
        let to_download: Vec<ObjectInfo> = remote
            .iter()
            .filter(|o| manifest.get(&o.name).is_none_or(|e| e.remote_gen != o.generation))
            .cloned()
            .collect();
        let semaphore = Arc::new(Semaphore::new(self.config.download_concurrency.max(1)));
        let downloads: Vec<Result<LocalFile, String>> = stream::iter(to_download)
            .map(|obj| {
                let store = self.store.clone();
                let semaphore = Arc::clone(&semaphore);
                let root = work_root.to_path_buf();
                async move {
                    let _permit = semaphore.acquire().await;
                    fetch_object(&store, &root, obj).await
                }
            })
            .buffer_unordered(self.config.download_concurrency.max(1))
            .collect()
            .await;

        let mut downloaded: HashSet<String> = HashSet::new();
        for result in downloads {
            match result {
                Ok(file) => {
                    if changed.contains(file.rel.as_str()) {
                        // A local edit just lost to the remote version.
                        stats.conflicts += 1;
                    }
                    stats.downloaded += 1;
                    manifest.insert(
                        file.rel.clone(),
                        ManifestEntry {
                            remote_gen: file.remote_gen.clone().unwrap_or_default(),
                            local_mtime: file.mtime_ms,
                            local_size: file.size,
                        },
                    );
                    downloaded.insert(file.rel);
                }
                Err(name) => {
                    stats.conflicts += 1;
                    warn!(object = %name, "download skipped");
                }
            }
        }

        // --- upload pass ---
        if self.config.enable_upload {
            let to_upload: Vec<UploadPlan> = local_files
                .iter()
                .filter(|f| changed.contains(f.rel.as_str()) && !downloaded.contains(&f.rel))
                .filter_map(|f| {
                    let entry = manifest.get(&f.rel);
                    let remote_gen = remote_gens.get(f.rel.as_str());
                    let precondition = match (entry, remote_gen) {
                        (Some(e), Some(g)) if e.remote_gen != *g => {
                            stats.conflicts += 1;
                            return None;
                        }
                        // Never seen by the mirror but already present
                        // remotely: uploading would clobber someone else.
                        (None, Some(_)) => {
                            stats.conflicts += 1;
                            return None;
                        }
                        (Some(e), _) => Precondition::Generation(e.remote_gen.clone()),
                        (None, None) => Precondition::Absent,
                    };
                    Some(UploadPlan { file: f.clone(), precondition })
                })
                .collect();

            let semaphore = Arc::new(Semaphore::new(self.config.upload_concurrency.max(1)));
            let uploads: Vec<Result<LocalFile, String>> = stream::iter(to_upload)
                .map(|plan| {
                    let store = self.store.clone();
                    let semaphore = Arc::clone(&semaphore);
                    let root = work_root.to_path_buf();
                    async move {
                        let _permit = semaphore.acquire().await;
                        push_file(&store, &root, plan).await
                    }
                })
                .buffer_unordered(self.config.upload_concurrency.max(1))
                .collect()
                .await;

            for result in uploads {
                match result {
                    Ok(file) => {
                        stats.uploaded += 1;
                        manifest.insert(
                            file.rel,
                            ManifestEntry {
                                remote_gen: file.remote_gen.unwrap_or_default(),
                                local_mtime: file.mtime_ms,
                                local_size: file.size,
                            },
                        );
                    }
                    Err(name) => {
                        stats.conflicts += 1;
                        debug!(object = %name, "upload skipped");
                    }
                }
            }
        }

        manifest
            .save(work_root)
            .map_err(|e| ObjectError::Transient(format!("manifest save failed: {}", e)))?;
        info!(
            work_root = %work_root.display(),
            scanned = stats.scanned_remote,
            downloaded = stats.downloaded,
            uploaded = stats.uploaded,
            conflicts = stats.conflicts,
            "sync run complete"
        );
        Ok(stats)
    }
}

#[derive(Debug, Clone)]
struct LocalFile {
    rel: String,
    mtime_ms: u64,
    size: u64,
    remote_gen: Option<String>,
}

struct UploadPlan {
    file: LocalFile,
    precondition: Precondition,
}

async fn fetch_object(
    store: &ScopedStore,
    work_root: &Path,
    obj: ObjectInfo,
) -> Result<LocalFile, String> {
    let path = wb_sandbox::resolve_within(work_root, &obj.name).map_err(|_| obj.name.clone())?;
    let (data, generation) = store.download(&obj.name).await.map_err(|_| obj.name.clone())?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|_| obj.name.clone())?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, &data).await.map_err(|_| obj.name.clone())?;
    tokio::fs::rename(&tmp, &path).await.map_err(|_| obj.name.clone())?;

    let meta = tokio::fs::metadata(&path).await.map_err(|_| obj.name.clone())?;
    Ok(LocalFile {
        rel: obj.name,
        mtime_ms: mtime_ms(&meta),
        size: meta.len(),
        remote_gen: Some(generation),
    })
}

async fn push_file(
    store: &ScopedStore,
    work_root: &Path,
    plan: UploadPlan,
) -> Result<LocalFile, String> {
    let rel = plan.file.rel.clone();
    let path = wb_sandbox::resolve_within(work_root, &rel).map_err(|_| rel.clone())?;
    let data = tokio::fs::read(&path).await.map_err(|_| rel.clone())?;
    let generation = store
        .upload(&rel, Bytes::from(data), plan.precondition)
        .await
        .map_err(|_| rel.clone())?;
    Ok(LocalFile { remote_gen: Some(generation), ..plan.file })
}

fn mtime_ms(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Walk the local tree, returning files relative to the root with their
/// stats. The manifest and in-flight temp files are not mirrored.
fn walk_local(root: &Path) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let Ok(rel_path) = path.strip_prefix(root) else { continue };
            let rel = rel_path
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            if rel == MANIFEST_NAME || rel.ends_with(".tmp") {
                continue;
            }
            let meta = entry.metadata()?;
            files.push(LocalFile {
                rel,
                mtime_ms: mtime_ms(&meta),
                size: meta.len(),
                remote_gen: None,
            });
        }
    }
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
