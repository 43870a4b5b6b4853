// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transactional document store seam.
//!
//! Documents are schema-less JSON values in named collections, keyed by
//! scope-prefixed string keys (`{userId}/{projectId}/…`). The bridge needs
//! five primitives from its metadata backend: create-if-absent, get,
//! set-with-merge, delete, and a transactional read-modify-write — plus an
//! indexed equality query. Mutual exclusion rides entirely on `transact`
//! being linearizable per key.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("document not found: {0}")]
    NotFound(String),

    /// Retryable backend failure (I/O, connection loss).
    #[error("storage error: {0}")]
    Transient(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// What a transaction closure decided after seeing the current document.
#[derive(Debug, Clone)]
pub enum TxnDecision {
    /// Replace (or create) the document with this value.
    Write(Value),
    /// Remove the document.
    Delete,
    /// Leave the document untouched; the transaction commits nothing.
    Abort,
}

/// Result of a transactional read-modify-write.
#[derive(Debug, Clone)]
pub struct TxnOutcome {
    /// False when the closure aborted.
    pub committed: bool,
    /// The document as left by the transaction (the pre-existing value on
    /// abort, the written value on write, `None` after delete or when the
    /// key never existed).
    pub value: Option<Value>,
}

/// A transactional document store.
///
/// Implementations must make `transact` linearizable per key: two racing
/// transactions on the same key observe each other's committed writes in
/// some total order. That property is what makes lock acquisition safe.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Create a document; fails with [`StoreError::AlreadyExists`] when the
    /// key is taken.
    async fn create(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Shallow-merge the fields of `patch` into the document, creating it
    /// when absent. Non-object patches replace the document.
    async fn merge(&self, collection: &str, key: &str, patch: Value) -> Result<(), StoreError>;

    /// Remove a document. Deleting an absent key is not an error.
    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Transactional read-modify-write of a single document.
    async fn transact<'f>(
        &self,
        collection: &str,
        key: &str,
        f: Box<dyn for<'a> FnMut(Option<&'a Value>) -> TxnDecision + Send + 'f>,
    ) -> Result<TxnOutcome, StoreError>;

    /// All documents in `collection` whose key starts with `prefix` and
    /// whose top-level `field` equals `value`.
    async fn query_eq(
        &self,
        collection: &str,
        prefix: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError>;
}
