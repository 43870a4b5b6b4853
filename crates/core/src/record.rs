// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted metadata documents.
//!
//! These are the schema-less JSON documents stored in the metadata store,
//! validated into typed records at the boundary. Unknown fields are ignored
//! on read; optional fields default so older documents keep deserializing.
//! All wall-clock fields are epoch milliseconds.

use crate::{ConsumerId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How the executor pair for a project is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerMode {
    #[serde(rename = "local-sandbox")]
    LocalSandbox,
    #[serde(rename = "remote-job")]
    RemoteJob,
}

impl fmt::Display for RunnerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerMode::LocalSandbox => write!(f, "local-sandbox"),
            RunnerMode::RemoteJob => write!(f, "remote-job"),
        }
    }
}

/// Where the lock-holding consumer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerType {
    Cloud,
    Local,
}

/// Runtime descriptor attached to a held lock by its owner.
///
/// Opaque to the Lock Manager; the launcher writes it after a successful
/// start and the stop path reads it to find what to tear down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeInfo {
    pub mode: Option<RunnerMode>,
    pub producer_name: Option<String>,
    pub consumer_name: Option<String>,
    pub consumer_port: Option<u16>,
    /// Remote operation handle (job name) in remote-job mode.
    pub remote_op: Option<String>,
    pub stop_requested: bool,
    pub stop_at: Option<u64>,
}

/// The per-project consumer lock document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLock {
    pub consumer_id: ConsumerId,
    pub consumer_type: ConsumerType,
    pub lease_ms: u64,
    pub acquired_at: u64,
    #[serde(default)]
    pub runtime: RuntimeInfo,
}

impl ConsumerLock {
    /// A lock is expired once a full lease has elapsed without renewal.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.acquired_at) >= self.lease_ms
    }
}

/// A managed workspace directory scoped to a project (and optionally to a
/// session). Live while heartbeats keep `live_at` within the TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub workspace_id: WorkspaceId,
    pub project_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: u64,
    pub live_at: u64,
}

impl WorkspaceRecord {
    pub fn is_live(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.live_at) <= ttl_ms
    }
}

/// Registration of one workflow execution. Never deleted by the core;
/// `status`/`ended` are best-effort mirrors of the status document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRecord {
    pub exec_id: String,
    pub session_id: String,
    pub created_at: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ended: Option<bool>,
    #[serde(default)]
    pub updated_at: Option<u64>,
}

/// Reported status of an execution. The status field is an open string set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecStatusRecord {
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub ended: bool,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub workflow: Option<Value>,
}

/// Parent/child edge between two executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecLinkRecord {
    pub calling_exec: String,
    pub triggered_exec: String,
    pub session_id: String,
    pub created_at: u64,
}

impl ExecLinkRecord {
    /// Stable document id for the edge; upserts are idempotent on it.
    pub fn link_key(calling: &str, triggered: &str) -> String {
        format!("{}:{}", calling, triggered)
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
