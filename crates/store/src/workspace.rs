// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace registry.
//!
//! A workspace names a directory on the shared mount, scoped to a project
//! and optionally to a session. Heartbeats keep it live; resolve prefers
//! reusing a live workspace over minting a new id so repeated starts land
//! in the same directory.

use crate::doc::{DocStore, StoreError, TxnDecision};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use wb_core::{Clock, Scope, SystemClock, WorkspaceId, WorkspaceRecord};

const COLLECTION: &str = "workspaces";

/// Default workspace TTL: 5 minutes without a heartbeat.
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

#[derive(Clone)]
pub struct Workspaces<C: Clock = SystemClock> {
    store: Arc<dyn DocStore>,
    clock: C,
}

impl Workspaces<SystemClock> {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store, clock: SystemClock }
    }
}

impl<C: Clock> Workspaces<C> {
    pub fn with_clock(store: Arc<dyn DocStore>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Reuse the freshest live workspace for `(project, session)` or create
    /// a new one.
    pub async fn resolve_or_create(
        &self,
        scope: &Scope,
        session_id: Option<&str>,
        ttl_ms: u64,
    ) -> Result<WorkspaceRecord, StoreError> {
        let now = self.clock.epoch_ms();
        let rows = self
            .store
            .query_eq(
                COLLECTION,
                &scope.query_prefix(),
                "projectId",
                &json!(scope.project_id()),
            )
            .await?;

        let live = rows
            .into_iter()
            .filter_map(|v| serde_json::from_value::<WorkspaceRecord>(v).ok())
            .filter(|ws| ws.session_id.as_deref() == session_id && ws.is_live(now, ttl_ms))
            .max_by_key(|ws| ws.live_at);

        if let Some(ws) = live {
            // Refresh so the caller's lease starts from a full TTL.
            if let Some(refreshed) = self.heartbeat(scope, &ws.workspace_id).await? {
                return Ok(refreshed);
            }
            return Ok(ws);
        }

        let record = WorkspaceRecord {
            workspace_id: WorkspaceId::new(),
            project_id: scope.project_id().to_string(),
            session_id: session_id.map(str::to_string),
            created_at: now,
            live_at: now,
        };
        self.store
            .create(
                COLLECTION,
                &scope.doc_key(record.workspace_id.as_str()),
                serde_json::to_value(&record)?,
            )
            .await?;
        info!(scope = %scope, workspace_id = %record.workspace_id, session_id = ?session_id, "workspace created");
        Ok(record)
    }

    /// Bump `live_at` to now. Never moves it backwards, so a slow heartbeat
    /// racing a fast one cannot shrink the liveness window.
    pub async fn heartbeat(
        &self,
        scope: &Scope,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<WorkspaceRecord>, StoreError> {
        let now = self.clock.epoch_ms();
        let outcome = self
            .store
            .transact(
                COLLECTION,
                &scope.doc_key(workspace_id.as_str()),
                Box::new(move |current| {
                    let Some(mut ws) = current
                        .and_then(|v| serde_json::from_value::<WorkspaceRecord>(v.clone()).ok())
                    else {
                        return TxnDecision::Abort;
                    };
                    ws.live_at = ws.live_at.max(now);
                    match serde_json::to_value(&ws) {
                        Ok(doc) => TxnDecision::Write(doc),
                        Err(_) => TxnDecision::Abort,
                    }
                }),
            )
            .await?;
        match outcome.value {
            Some(v) if outcome.committed => Ok(Some(serde_json::from_value(v)?)),
            _ => Ok(None),
        }
    }

    pub async fn get(
        &self,
        scope: &Scope,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<WorkspaceRecord>, StoreError> {
        let doc = self.store.get(COLLECTION, &scope.doc_key(workspace_id.as_str())).await?;
        match doc {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
