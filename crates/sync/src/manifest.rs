// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync manifest.
//!
//! One JSON file at the work root maps relative object names to the
//! remote generation and local file stats observed at the last successful
//! transfer. A malformed manifest is treated as empty — the next run
//! re-downloads whatever differs remotely and rebuilds it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Manifest file name, relative to the work root.
pub const MANIFEST_NAME: &str = ".gcs-manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub remote_gen: String,
    pub local_mtime: u64,
    pub local_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Load the manifest from a work root. Missing or malformed files
    /// yield an empty manifest.
    pub fn load(work_root: &Path) -> Self {
        let path = work_root.join(MANIFEST_NAME);
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed manifest, treating as empty");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist atomically next to the files it describes.
    pub fn save(&self, work_root: &Path) -> std::io::Result<()> {
        let path = work_root.join(MANIFEST_NAME);
        let tmp = work_root.join(format!("{}.tmp", MANIFEST_NAME));
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, &path)
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<ManifestEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
