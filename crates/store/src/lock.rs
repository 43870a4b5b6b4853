// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project consumer lock.
//!
//! One lease document per `(user, project)` scope gates executor
//! exclusivity. Acquisition is a transactional read-modify-write: an
//! absent or expired document is replaced, a live one aborts the
//! transaction and surfaces the current holder. Renewal and release are
//! owner-scoped; a holder that dies silently is displaced once its lease
//! elapses.

use crate::doc::{DocStore, StoreError, TxnDecision};
use crate::retry::with_retries;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wb_core::{Clock, ConsumerId, ConsumerLock, ConsumerType, RuntimeInfo, Scope, SystemClock};

const COLLECTION: &str = "locks";

/// The holder observed by a losing `acquire`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConflict {
    pub current_consumer_id: ConsumerId,
    pub acquired_at: u64,
    pub lease_ms: u64,
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    Acquired(ConsumerLock),
    Held(LockConflict),
}

/// Lease-based mutual exclusion over the document store.
#[derive(Clone)]
pub struct LockManager<C: Clock = SystemClock> {
    store: Arc<dyn DocStore>,
    clock: C,
}

impl LockManager<SystemClock> {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store, clock: SystemClock }
    }
}

impl<C: Clock> LockManager<C> {
    pub fn with_clock(store: Arc<dyn DocStore>, clock: C) -> Self {
        Self { store, clock }
    }

    fn key(scope: &Scope) -> String {
        scope.key_prefix()
    }

    /// Try to take the lock for `scope`.
    ///
    /// Exactly one caller wins per expiry window; losers get the current
    /// holder back. Transient store errors are retried with bounded
    /// backoff before surfacing.
    pub async fn acquire(
        &self,
        scope: &Scope,
        consumer_id: ConsumerId,
        lease_ms: u64,
        consumer_type: ConsumerType,
    ) -> Result<AcquireOutcome, StoreError> {
        let now = self.clock.epoch_ms();
        let fresh = ConsumerLock {
            consumer_id,
            consumer_type,
            lease_ms,
            acquired_at: now,
            runtime: RuntimeInfo::default(),
        };
        let fresh_doc = serde_json::to_value(&fresh)?;
        let key = Self::key(scope);

        let outcome = with_retries("lock.acquire", || {
            let fresh_doc = fresh_doc.clone();
            let key = key.as_str();
            async move {
                self.store
                    .transact(
                        COLLECTION,
                        key,
                        Box::new(move |current| match parse_lock(current) {
                            Some(existing) if !existing.is_expired(now) => TxnDecision::Abort,
                            _ => TxnDecision::Write(fresh_doc.clone()),
                        }),
                    )
                    .await
            }
        })
        .await?;

        if outcome.committed {
            info!(scope = %scope, consumer_id = %fresh.consumer_id, lease_ms, "lock acquired");
            return Ok(AcquireOutcome::Acquired(fresh));
        }

        let held = outcome
            .value
            .as_ref()
            .and_then(|v| parse_lock(Some(v)))
            .ok_or_else(|| StoreError::Transient("lock vanished during acquire".into()))?;
        debug!(scope = %scope, holder = %held.consumer_id, "lock held");
        Ok(AcquireOutcome::Held(LockConflict {
            current_consumer_id: held.consumer_id,
            acquired_at: held.acquired_at,
            lease_ms: held.lease_ms,
        }))
    }

    /// Merge a runtime descriptor into the lock, only when `consumer_id`
    /// still owns it. A mismatch is a silent no-op.
    pub async fn set_runtime(
        &self,
        scope: &Scope,
        consumer_id: &ConsumerId,
        runtime: RuntimeInfo,
    ) -> Result<bool, StoreError> {
        let outcome = self
            .store
            .transact(
                COLLECTION,
                &Self::key(scope),
                Box::new(move |current| match parse_lock(current) {
                    Some(mut lock) if lock.consumer_id == *consumer_id => {
                        lock.runtime = runtime.clone();
                        match serde_json::to_value(&lock) {
                            Ok(doc) => TxnDecision::Write(doc),
                            Err(_) => TxnDecision::Abort,
                        }
                    }
                    _ => TxnDecision::Abort,
                }),
            )
            .await?;
        Ok(outcome.committed)
    }

    /// Mark a stop request in the runtime descriptor, regardless of owner.
    /// Used by the stop path for remote jobs it cannot reach directly.
    pub async fn mark_stop(&self, scope: &Scope) -> Result<bool, StoreError> {
        let now = self.clock.epoch_ms();
        let outcome = self
            .store
            .transact(
                COLLECTION,
                &Self::key(scope),
                Box::new(move |current| match parse_lock(current) {
                    Some(mut lock) => {
                        lock.runtime.stop_requested = true;
                        lock.runtime.stop_at = Some(now);
                        match serde_json::to_value(&lock) {
                            Ok(doc) => TxnDecision::Write(doc),
                            Err(_) => TxnDecision::Abort,
                        }
                    }
                    None => TxnDecision::Abort,
                }),
            )
            .await?;
        Ok(outcome.committed)
    }

    pub async fn get(&self, scope: &Scope) -> Result<Option<ConsumerLock>, StoreError> {
        let doc = self.store.get(COLLECTION, &Self::key(scope)).await?;
        match doc {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Reset the lease window. Only the owner renews; anyone else is a
    /// no-op returning false.
    pub async fn renew(&self, scope: &Scope, consumer_id: &ConsumerId) -> Result<bool, StoreError> {
        let now = self.clock.epoch_ms();
        let outcome = self
            .store
            .transact(
                COLLECTION,
                &Self::key(scope),
                Box::new(move |current| match parse_lock(current) {
                    Some(mut lock) if lock.consumer_id == *consumer_id => {
                        lock.acquired_at = now;
                        match serde_json::to_value(&lock) {
                            Ok(doc) => TxnDecision::Write(doc),
                            Err(_) => TxnDecision::Abort,
                        }
                    }
                    _ => TxnDecision::Abort,
                }),
            )
            .await?;
        Ok(outcome.committed)
    }

    /// Delete the lock. With `force` the owner check is skipped; otherwise
    /// only the named consumer releases. Idempotent — releasing an absent
    /// lock returns false.
    pub async fn release(
        &self,
        scope: &Scope,
        consumer_id: Option<&ConsumerId>,
        force: bool,
    ) -> Result<bool, StoreError> {
        let outcome = self
            .store
            .transact(
                COLLECTION,
                &Self::key(scope),
                Box::new(move |current| match parse_lock(current) {
                    Some(lock) if force || Some(&lock.consumer_id) == consumer_id => {
                        TxnDecision::Delete
                    }
                    _ => TxnDecision::Abort,
                }),
            )
            .await?;
        if outcome.committed {
            info!(scope = %scope, force, "lock released");
        }
        Ok(outcome.committed)
    }

    /// Owner-scoped release where failures are logged, not propagated.
    /// Exit monitors call this; there is nobody left to handle the error.
    pub async fn release_quiet(&self, scope: &Scope, consumer_id: &ConsumerId) {
        if let Err(e) = self.release(scope, Some(consumer_id), false).await {
            warn!(scope = %scope, consumer_id = %consumer_id, error = %e, "lock release failed");
        }
    }
}

fn parse_lock(doc: Option<&Value>) -> Option<ConsumerLock> {
    doc.and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
