// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wb-sync: bidirectional mirror between a work root and an object store.
//!
//! Change detection is manifest-based: a `.gcs-manifest.json` at the work
//! root records the remote generation and local stats seen at the last
//! successful transfer of each object. Uploads are generation-conditional,
//! so a remote writer is never silently overwritten — drift is a conflict,
//! counted and skipped.

pub mod engine;
pub mod manifest;
pub mod object;
pub mod scoped;

pub use engine::{SyncConfig, SyncEngine, SyncGate, SyncStats};
pub use manifest::{Manifest, ManifestEntry, MANIFEST_NAME};
pub use object::{MemoryObjectStore, ObjectError, ObjectInfo, ObjectStore, Precondition};
pub use scoped::ScopedStore;
