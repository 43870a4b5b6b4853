// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for the in-memory store.
//!
//! The full collection map is written as zstd-compressed JSON via a temp
//! file and rename, so a crash mid-write never corrupts the previous
//! snapshot. A snapshot that fails to parse is ignored and the store starts
//! empty; locks re-form through lease expiry and registrations are
//! re-reported by the upstream.

use crate::memory::{Collections, MemoryDocStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Current snapshot schema version
const SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(rename = "v")]
    version: u32,
    created_at: DateTime<Utc>,
    collections: Collections,
}

/// Write the store's contents to `path` atomically.
pub fn save(store: &MemoryDocStore, path: &Path) -> Result<(), SnapshotError> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        created_at: Utc::now(),
        collections: store.export(),
    };
    let json = serde_json::to_vec(&snapshot)?;
    let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &compressed)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a store from `path`. Missing or unreadable snapshots yield an
/// empty store.
pub fn load(path: &Path) -> MemoryDocStore {
    if !path.exists() {
        return MemoryDocStore::new();
    }
    match read_snapshot(path) {
        Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
            MemoryDocStore::from_collections(snapshot.collections)
        }
        Ok(snapshot) => {
            warn!(path = %path.display(), version = snapshot.version, "unsupported snapshot version, starting empty");
            MemoryDocStore::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable snapshot, starting empty");
            MemoryDocStore::new()
        }
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let compressed = fs::read(path)?;
    let json = zstd::decode_all(compressed.as_slice())?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
