// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared server context.
//!
//! One [`AppCtx`] is built at startup and handed to every handler and
//! long-lived task. Configuration is snapshotted from the environment
//! once so a request never observes a half-changed config.

use crate::shutdown::Shutdown;
use crate::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wb_runner::RunnerAdapter;
use wb_store::{DocStore, ExecRegistry, LockManager, MemoryDocStore, Workspaces};
use wb_sync::{ObjectStore, SyncGate};

/// Snapshot of every tunable the server reads.
#[derive(Debug, Clone)]
pub struct Config {
    pub work_root: PathBuf,
    pub work_prefix_template: String,
    pub events_heartbeat: Duration,
    pub reconnect_backoff: Duration,
    pub run_command_timeout: Duration,
    pub read_file_max_bytes: usize,
    pub output_max_bytes: usize,
    pub sync_on_start: bool,
    pub sync_interval: Duration,
    pub enable_upload: bool,
    pub download_concurrency: usize,
    pub upload_concurrency: usize,
    pub shutdown_timeout: Duration,
    pub auth_token: Option<String>,
    pub upstream_url: Option<String>,
    pub upstream_audience: Option<String>,
    pub upstream_token: Option<String>,
    pub consumer_image: String,
    pub consumer_port: u16,
    pub consumer_base_url: Option<String>,
    pub sync_bucket: Option<String>,
    pub sync_prefix_template: String,
    pub idle_watchdog: Duration,
    pub default_lease_ms: u64,
    pub workspace_ttl_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            work_root: env::work_root(),
            work_prefix_template: env::work_prefix_template(),
            events_heartbeat: env::events_heartbeat(),
            reconnect_backoff: env::reconnect_backoff(),
            run_command_timeout: env::run_command_timeout(),
            read_file_max_bytes: env::read_file_max_bytes(),
            output_max_bytes: env::output_max_bytes(),
            sync_on_start: env::sync_on_start(),
            sync_interval: env::sync_interval(),
            enable_upload: env::gcs_enable_upload(),
            download_concurrency: env::gcs_download_concurrency(),
            upload_concurrency: env::gcs_upload_concurrency(),
            shutdown_timeout: env::shutdown_timeout(),
            auth_token: env::auth_token(),
            upstream_url: env::upstream_url(),
            upstream_audience: env::upstream_audience(),
            upstream_token: env::upstream_token(),
            consumer_image: env::consumer_image(),
            consumer_port: env::consumer_port(),
            consumer_base_url: env::consumer_base_url(),
            sync_bucket: env::sync_bucket(),
            sync_prefix_template: env::sync_prefix_template(),
            idle_watchdog: env::idle_watchdog(),
            default_lease_ms: env::default_lease_ms(),
            workspace_ttl_ms: env::workspace_ttl_ms(),
        }
    }
}

/// Everything handlers and background tasks share.
pub struct AppCtx {
    pub store: Arc<MemoryDocStore>,
    pub locks: LockManager,
    pub workspaces: Workspaces,
    pub execs: ExecRegistry,
    pub runner: Arc<dyn RunnerAdapter>,
    /// Ambient object store; per-stream views are narrowed from it.
    /// `None` disables the sync engine entirely.
    pub objects: Option<Arc<dyn ObjectStore>>,
    pub sync_gate: Arc<SyncGate>,
    pub shutdown: Shutdown,
    pub config: Config,
}

pub type SharedCtx = Arc<AppCtx>;

impl AppCtx {
    pub fn new(
        store: Arc<MemoryDocStore>,
        runner: Arc<dyn RunnerAdapter>,
        objects: Option<Arc<dyn ObjectStore>>,
        config: Config,
    ) -> Self {
        let doc_store: Arc<dyn DocStore> = store.clone();
        Self {
            locks: LockManager::new(doc_store.clone()),
            workspaces: Workspaces::new(doc_store.clone()),
            execs: ExecRegistry::new(doc_store),
            store,
            runner,
            objects,
            sync_gate: Arc::new(SyncGate::new()),
            shutdown: Shutdown::new(),
            config,
        }
    }
}
