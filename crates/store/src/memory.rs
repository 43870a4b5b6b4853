// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory document store.
//!
//! Collections are ordered maps behind a single `parking_lot::Mutex`;
//! `transact` runs its closure under the lock, which makes every
//! read-modify-write linearizable. The closure must therefore stay
//! synchronous and cheap — the registries only parse and rebuild one
//! document inside it.

use crate::doc::{DocStore, StoreError, TxnDecision, TxnOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub(crate) type Collections = HashMap<String, BTreeMap<String, Value>>;

/// In-memory [`DocStore`] backing a single bridge process.
#[derive(Default)]
pub struct MemoryDocStore {
    collections: Mutex<Collections>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with previously snapshotted collections.
    pub(crate) fn from_collections(collections: Collections) -> Self {
        Self { collections: Mutex::new(collections) }
    }

    /// Clone of the full contents, for snapshotting.
    pub(crate) fn export(&self) -> Collections {
        self.collections.lock().clone()
    }

}

#[async_trait]
impl DocStore for MemoryDocStore {
    async fn create(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError> {
        let mut all = self.collections.lock();
        let coll = all.entry(collection.to_string()).or_default();
        if coll.contains_key(key) {
            return Err(StoreError::AlreadyExists(format!("{}/{}", collection, key)));
        }
        coll.insert(key.to_string(), doc);
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let all = self.collections.lock();
        Ok(all.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn merge(&self, collection: &str, key: &str, patch: Value) -> Result<(), StoreError> {
        let mut all = self.collections.lock();
        let coll = all.entry(collection.to_string()).or_default();
        let merged = match (coll.remove(key), patch) {
            (Some(Value::Object(mut existing)), Value::Object(fields)) => {
                for (k, v) in fields {
                    existing.insert(k, v);
                }
                Value::Object(existing)
            }
            (_, patch) => patch,
        };
        coll.insert(key.to_string(), merged);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let mut all = self.collections.lock();
        if let Some(coll) = all.get_mut(collection) {
            coll.remove(key);
        }
        Ok(())
    }

    async fn transact<'f>(
        &self,
        collection: &str,
        key: &str,
        mut f: Box<dyn for<'a> FnMut(Option<&'a Value>) -> TxnDecision + Send + 'f>,
    ) -> Result<TxnOutcome, StoreError> {
        let mut all = self.collections.lock();
        let coll = all.entry(collection.to_string()).or_default();
        let current = coll.get(key).cloned();
        let decision = f(current.as_ref());
        drop(f);
        match decision {
            TxnDecision::Write(doc) => {
                coll.insert(key.to_string(), doc.clone());
                Ok(TxnOutcome { committed: true, value: Some(doc) })
            }
            TxnDecision::Delete => {
                coll.remove(key);
                Ok(TxnOutcome { committed: true, value: None })
            }
            TxnDecision::Abort => Ok(TxnOutcome { committed: false, value: current }),
        }
    }

    async fn query_eq(
        &self,
        collection: &str,
        prefix: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let all = self.collections.lock();
        let Some(coll) = all.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(coll
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, doc)| doc.get(field) == Some(value))
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
