// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object store seam.
//!
//! The mirror needs four things from its backend: prefix listing,
//! versioned download, generation-conditional upload, and a per-object
//! `generation` token. Generations are opaque strings; only equality
//! matters. The in-memory implementation backs tests and local runs.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// The generation condition on an upload did not hold.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("object store error: {0}")]
    Transient(String),
}

/// Listing entry: object name plus its current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub generation: String,
}

impl ObjectInfo {
    /// Folder placeholders carry no content and are skipped by the mirror.
    pub fn is_folder(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Condition attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The object must not exist (`ifGenerationMatch = 0`).
    Absent,
    /// The object must exist at exactly this generation.
    Generation(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List objects under `prefix`. An unknown bucket or empty prefix
    /// listing is an empty result, not an error.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, ObjectError>;

    /// Fetch an object's content and the generation it was read at.
    async fn download(&self, bucket: &str, name: &str) -> Result<(Bytes, String), ObjectError>;

    /// Conditionally write an object; returns the new generation.
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> Result<String, ObjectError>;
}

#[derive(Default)]
struct Stored {
    data: Bytes,
    generation: u64,
}

/// In-memory [`ObjectStore`] with monotonically increasing generations.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Stored>>,
    counter: Mutex<u64>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        let mut counter = self.counter.lock();
        *counter += 1;
        *counter
    }

    /// Test helper: put an object unconditionally, returning its generation.
    pub fn seed(&self, bucket: &str, name: &str, data: impl Into<Bytes>) -> String {
        let generation = self.next_generation();
        self.objects.lock().insert(
            (bucket.to_string(), name.to_string()),
            Stored { data: data.into(), generation },
        );
        generation.to_string()
    }

    /// Test helper: raw content of an object, if present.
    pub fn content(&self, bucket: &str, name: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), name.to_string()))
            .map(|s| s.data.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, ObjectError> {
        let objects = self.objects.lock();
        Ok(objects
            .iter()
            .filter(|((b, name), _)| b == bucket && name.starts_with(prefix))
            .map(|((_, name), stored)| ObjectInfo {
                name: name.clone(),
                generation: stored.generation.to_string(),
            })
            .collect())
    }

    async fn download(&self, bucket: &str, name: &str) -> Result<(Bytes, String), ObjectError> {
        let objects = self.objects.lock();
        let stored = objects
            .get(&(bucket.to_string(), name.to_string()))
            .ok_or_else(|| ObjectError::NotFound(name.to_string()))?;
        Ok((stored.data.clone(), stored.generation.to_string()))
    }

    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> Result<String, ObjectError> {
        let generation = self.next_generation();
        let mut objects = self.objects.lock();
        let key = (bucket.to_string(), name.to_string());
        let current = objects.get(&key).map(|s| s.generation.to_string());
        match (&precondition, current) {
            (Precondition::Absent, Some(_)) => {
                return Err(ObjectError::PreconditionFailed(name.to_string()));
            }
            (Precondition::Generation(expected), Some(actual)) if *expected != actual => {
                return Err(ObjectError::PreconditionFailed(name.to_string()));
            }
            (Precondition::Generation(_), None) => {
                return Err(ObjectError::PreconditionFailed(name.to_string()));
            }
            _ => {}
        }
        objects.insert(key, Stored { data, generation });
        Ok(generation.to_string())
    }
}

#[cfg(test)]
#[path = "object_tests.rs"]
mod tests;
