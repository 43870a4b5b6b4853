// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution lineage registry.
//!
//! Three collections cooperate here: `execs` (one registration per
//! workflow execution), `exec_status` (latest reported status per exec),
//! and `exec_links` (parent/child edges). Registrations are never deleted;
//! status updates mirror a summary onto the registration best-effort; the
//! tree endpoint derives a forest from registrations plus edges.

use crate::doc::{DocStore, StoreError, TxnDecision};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use wb_core::{Clock, ExecLinkRecord, ExecRecord, ExecStatusRecord, Scope, SystemClock};

const EXECS: &str = "execs";
const STATUS: &str = "exec_status";
const LINKS: &str = "exec_links";

/// Status reported for an exec with no status document.
pub const STATUS_UNKNOWN: &str = "UNKNOWN";

/// Hard cap and default for `latest_statuses`.
pub const LATEST_LIMIT_MAX: usize = 50;
pub const LATEST_LIMIT_DEFAULT: usize = 5;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("status update carries no fields")]
    EmptyUpdate,
}

/// Partial status report; absent fields keep their stored values.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub status: Option<String>,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub ended: Option<bool>,
    pub updated: Option<u64>,
    pub workflow: Option<Value>,
}

impl StatusPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.result.is_none()
            && self.error.is_none()
            && self.ended.is_none()
            && self.updated.is_none()
            && self.workflow.is_none()
    }
}

/// One row of `latest_statuses`: a registration merged with its status doc.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecStatusEntry {
    pub exec_id: String,
    pub created_at: u64,
    pub status: String,
    pub ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// Node of the derived exec tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecNode {
    pub exec_id: String,
    pub created_at: u64,
    pub status: String,
    pub ended: bool,
    pub children: Vec<ExecNode>,
}

#[derive(Clone)]
pub struct ExecRegistry<C: Clock = SystemClock> {
    store: Arc<dyn DocStore>,
    clock: C,
}

impl ExecRegistry<SystemClock> {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store, clock: SystemClock }
    }
}

impl<C: Clock> ExecRegistry<C> {
    pub fn with_clock(store: Arc<dyn DocStore>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Register an execution. Idempotent: re-registering returns the
    /// existing record untouched.
    pub async fn register(
        &self,
        scope: &Scope,
        exec_id: &str,
        session_id: &str,
        created_at: Option<u64>,
    ) -> Result<ExecRecord, RegistryError> {
        let record = ExecRecord {
            exec_id: exec_id.to_string(),
            session_id: session_id.to_string(),
            created_at: created_at.unwrap_or_else(|| self.clock.epoch_ms()),
            status: None,
            ended: None,
            updated_at: None,
        };
        let key = scope.doc_key(exec_id);
        match self
            .store
            .create(EXECS, &key, serde_json::to_value(&record).map_err(StoreError::from)?)
            .await
        {
            Ok(()) => Ok(record),
            Err(StoreError::AlreadyExists(_)) => {
                let doc = self
                    .store
                    .get(EXECS, &key)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                Ok(serde_json::from_value(doc).map_err(StoreError::from)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Idempotent upsert of a parent/child edge.
    pub async fn link_register(
        &self,
        scope: &Scope,
        calling_exec: &str,
        triggered_exec: &str,
        session_id: &str,
        created_at: Option<u64>,
    ) -> Result<ExecLinkRecord, RegistryError> {
        let record = ExecLinkRecord {
            calling_exec: calling_exec.to_string(),
            triggered_exec: triggered_exec.to_string(),
            session_id: session_id.to_string(),
            created_at: created_at.unwrap_or_else(|| self.clock.epoch_ms()),
        };
        let doc = serde_json::to_value(&record).map_err(StoreError::from)?;
        let key = scope.doc_key(&ExecLinkRecord::link_key(calling_exec, triggered_exec));
        let outcome = self
            .store
            .transact(
                LINKS,
                &key,
                Box::new(move |current| match current {
                    Some(_) => TxnDecision::Abort,
                    None => TxnDecision::Write(doc.clone()),
                }),
            )
            .await?;
        match outcome.value {
            Some(v) => Ok(serde_json::from_value(v).map_err(StoreError::from)?),
            None => Ok(record),
        }
    }

    pub async fn links_by_calling(
        &self,
        scope: &Scope,
        calling_exec: &str,
    ) -> Result<Vec<ExecLinkRecord>, RegistryError> {
        let rows = self
            .store
            .query_eq(LINKS, &scope.query_prefix(), "callingExec", &json!(calling_exec))
            .await?;
        let mut links: Vec<ExecLinkRecord> = rows
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        links.sort_by_key(|l| l.created_at);
        Ok(links)
    }

    /// The newest link pointing at `triggered_exec`, when several parents
    /// registered the same child.
    pub async fn link_by_triggered(
        &self,
        scope: &Scope,
        triggered_exec: &str,
    ) -> Result<Option<ExecLinkRecord>, RegistryError> {
        let rows = self
            .store
            .query_eq(LINKS, &scope.query_prefix(), "triggeredExec", &json!(triggered_exec))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|v| serde_json::from_value::<ExecLinkRecord>(v).ok())
            .max_by_key(|l| l.created_at))
    }

    /// Upsert the status document for an exec, preserving `created_at`,
    /// then mirror `{status, ended, updated_at}` onto the registration.
    /// The mirror is best-effort; its failure never fails the update.
    pub async fn status_update(
        &self,
        scope: &Scope,
        exec_id: &str,
        patch: StatusPatch,
    ) -> Result<ExecStatusRecord, RegistryError> {
        if patch.is_empty() {
            return Err(RegistryError::EmptyUpdate);
        }
        let now = self.clock.epoch_ms();
        let updated_at = patch.updated.unwrap_or(now);
        let key = scope.doc_key(exec_id);

        let patch_for_txn = patch.clone();
        let outcome = self
            .store
            .transact(
                STATUS,
                &key,
                Box::new(move |current| {
                    let existing: Option<ExecStatusRecord> = current
                        .and_then(|v| serde_json::from_value(v.clone()).ok());
                    let mut record = existing.unwrap_or(ExecStatusRecord {
                        status: STATUS_UNKNOWN.to_string(),
                        result: None,
                        error: None,
                        ended: false,
                        created_at: now,
                        updated_at,
                        workflow: None,
                    });
                    if let Some(ref status) = patch_for_txn.status {
                        record.status = status.clone();
                    }
                    if let Some(ref result) = patch_for_txn.result {
                        record.result = Some(result.clone());
                    }
                    if let Some(ref error) = patch_for_txn.error {
                        record.error = Some(error.clone());
                    }
                    if let Some(ended) = patch_for_txn.ended {
                        record.ended = ended;
                    }
                    if let Some(ref workflow) = patch_for_txn.workflow {
                        record.workflow = Some(workflow.clone());
                    }
                    record.updated_at = updated_at;
                    match serde_json::to_value(&record) {
                        Ok(doc) => TxnDecision::Write(doc),
                        Err(_) => TxnDecision::Abort,
                    }
                }),
            )
            .await?;

        let stored: ExecStatusRecord = outcome
            .value
            .ok_or_else(|| StoreError::Transient("status vanished during update".into()))
            .and_then(|v| serde_json::from_value(v).map_err(StoreError::from))?;

        self.mirror_onto_registration(scope, exec_id, &stored).await;
        Ok(stored)
    }

    async fn mirror_onto_registration(&self, scope: &Scope, exec_id: &str, status: &ExecStatusRecord) {
        let found = self
            .store
            .query_eq(EXECS, &scope.query_prefix(), "execId", &json!(exec_id))
            .await;
        let mirror = json!({
            "status": status.status,
            "ended": status.ended,
            "updatedAt": status.updated_at,
        });
        match found {
            Ok(rows) if !rows.is_empty() => {
                if let Err(e) = self.store.merge(EXECS, &scope.doc_key(exec_id), mirror).await {
                    debug!(exec_id, error = %e, "status mirror failed");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(exec_id, error = %e, "status mirror lookup failed"),
        }
    }

    /// Newest registrations for a session, each merged with its status doc.
    pub async fn latest_statuses(
        &self,
        scope: &Scope,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExecStatusEntry>, RegistryError> {
        let limit = limit.unwrap_or(LATEST_LIMIT_DEFAULT).min(LATEST_LIMIT_MAX);
        let mut records = self.session_records(scope, session_id).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            entries.push(self.merge_status(scope, record).await);
        }
        Ok(entries)
    }

    async fn merge_status(&self, scope: &Scope, record: ExecRecord) -> ExecStatusEntry {
        match self.fetch_status(scope, &record.exec_id).await {
            Ok(Some(status)) => ExecStatusEntry {
                exec_id: record.exec_id,
                created_at: record.created_at,
                status: status.status,
                ended: status.ended,
                result: status.result,
                error: status.error,
                workflow: status.workflow,
                updated_at: Some(status.updated_at),
            },
            Ok(None) => ExecStatusEntry {
                exec_id: record.exec_id,
                created_at: record.created_at,
                status: STATUS_UNKNOWN.to_string(),
                ended: false,
                result: None,
                error: None,
                workflow: None,
                updated_at: None,
            },
            // A failed fetch is reported, not dropped.
            Err(e) => ExecStatusEntry {
                exec_id: record.exec_id,
                created_at: record.created_at,
                status: STATUS_UNKNOWN.to_string(),
                ended: false,
                result: None,
                error: Some(json!({ "message": e.to_string() })),
                workflow: None,
                updated_at: None,
            },
        }
    }

    async fn fetch_status(
        &self,
        scope: &Scope,
        exec_id: &str,
    ) -> Result<Option<ExecStatusRecord>, StoreError> {
        match self.store.get(STATUS, &scope.doc_key(exec_id)).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn session_records(
        &self,
        scope: &Scope,
        session_id: &str,
    ) -> Result<Vec<ExecRecord>, StoreError> {
        let rows = self
            .store
            .query_eq(EXECS, &scope.query_prefix(), "sessionId", &json!(session_id))
            .await?;
        Ok(rows.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect())
    }

    /// Derive the exec forest for a session.
    ///
    /// Children are grouped by `calling_exec` and ordered by link creation
    /// time; roots are registrations never named as a `triggered_exec`.
    /// When every registration is somebody's child (a cycle), the newest
    /// registration becomes the root. Unknown triggered ids produce no
    /// node. `latest_only` returns the single tree rooted at the newest
    /// registration.
    pub async fn tree(
        &self,
        scope: &Scope,
        session_id: &str,
        latest_only: bool,
    ) -> Result<Vec<ExecNode>, RegistryError> {
        let records = self.session_records(scope, session_id).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .query_eq(LINKS, &scope.query_prefix(), "sessionId", &json!(session_id))
            .await?;
        let mut links: Vec<ExecLinkRecord> =
            rows.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect();
        links.sort_by_key(|l| l.created_at);

        let by_id: HashMap<&str, &ExecRecord> =
            records.iter().map(|r| (r.exec_id.as_str(), r)).collect();
        let mut children: HashMap<&str, Vec<&ExecLinkRecord>> = HashMap::new();
        for link in &links {
            children.entry(link.calling_exec.as_str()).or_default().push(link);
        }
        let triggered: HashSet<&str> = links.iter().map(|l| l.triggered_exec.as_str()).collect();

        let newest = || -> Option<&ExecRecord> {
            records.iter().max_by_key(|r| r.created_at)
        };

        let mut roots: Vec<&ExecRecord> = if latest_only {
            newest().into_iter().collect()
        } else {
            let mut roots: Vec<&ExecRecord> =
                records.iter().filter(|r| !triggered.contains(r.exec_id.as_str())).collect();
            if roots.is_empty() {
                // Cycle fallback: every exec is somebody's child.
                roots = newest().into_iter().collect();
            }
            roots
        };
        roots.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut statuses: HashMap<String, Option<ExecStatusRecord>> = HashMap::new();
        for record in &records {
            let status = self.fetch_status(scope, &record.exec_id).await.unwrap_or_default();
            statuses.insert(record.exec_id.clone(), status);
        }

        let mut forest = Vec::with_capacity(roots.len());
        let mut visited = HashSet::new();
        for root in roots {
            if let Some(node) = build_node(root, &by_id, &children, &statuses, &mut visited) {
                forest.push(node);
            }
        }
        Ok(forest)
    }
}

fn build_node(
    record: &ExecRecord,
    by_id: &HashMap<&str, &ExecRecord>,
    children: &HashMap<&str, Vec<&ExecLinkRecord>>,
    statuses: &HashMap<String, Option<ExecStatusRecord>>,
    visited: &mut HashSet<String>,
) -> Option<ExecNode> {
    if !visited.insert(record.exec_id.clone()) {
        return None;
    }
    let (status, ended) = match statuses.get(&record.exec_id) {
        Some(Some(s)) => (s.status.clone(), s.ended),
        _ => (STATUS_UNKNOWN.to_string(), false),
    };
    let child_nodes = children
        .get(record.exec_id.as_str())
        .into_iter()
        .flatten()
        .filter_map(|link| by_id.get(link.triggered_exec.as_str()))
        .filter_map(|child| build_node(child, by_id, children, statuses, visited))
        .collect();
    Some(ExecNode {
        exec_id: record.exec_id.clone(),
        created_at: record.created_at,
        status,
        ended,
        children: child_nodes,
    })
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
