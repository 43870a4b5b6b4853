// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefix-narrowed view of an object store.
//!
//! Each stream syncs against exactly one `bucket + prefix`; the narrowed
//! store is the only handle the engine ever sees, so an engine bug cannot
//! reach outside the stream's slice of the bucket. Create permission is a
//! capability: when absent, creates are refused here and surface as
//! per-object conflicts rather than failures.

use crate::object::{ObjectError, ObjectInfo, ObjectStore, Precondition};
use bytes::Bytes;
use std::sync::Arc;

/// An [`ObjectStore`] pinned to one bucket and prefix, speaking relative
/// object names.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    allow_create: bool,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { inner, bucket: bucket.into(), prefix, allow_create: true }
    }

    /// Drop the create capability; updates remain allowed.
    pub fn without_create(mut self) -> Self {
        self.allow_create = false;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_name(&self, rel: &str) -> String {
        format!("{}{}", self.prefix, rel)
    }

    /// List the prefix; names come back relative to it.
    pub async fn list(&self) -> Result<Vec<ObjectInfo>, ObjectError> {
        let listed = match self.inner.list(&self.bucket, &self.prefix).await {
            Ok(listed) => listed,
            // A missing prefix mirrors as empty, same as GCS 404 on list.
            Err(ObjectError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(listed
            .into_iter()
            .filter_map(|info| {
                let rel = info.name.strip_prefix(&self.prefix)?.to_string();
                (!rel.is_empty()).then_some(ObjectInfo { name: rel, generation: info.generation })
            })
            .collect())
    }

    pub async fn download(&self, rel: &str) -> Result<(Bytes, String), ObjectError> {
        self.inner.download(&self.bucket, &self.full_name(rel)).await
    }

    pub async fn upload(
        &self,
        rel: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> Result<String, ObjectError> {
        if matches!(precondition, Precondition::Absent) && !self.allow_create {
            return Err(ObjectError::PermissionDenied(format!("create not permitted: {}", rel)));
        }
        self.inner.upload(&self.bucket, &self.full_name(rel), data, precondition).await
    }
}

#[cfg(test)]
#[path = "scoped_tests.rs"]
mod tests;
