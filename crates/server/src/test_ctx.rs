// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for server unit tests.

use crate::state::{AppCtx, Config, SharedCtx};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wb_runner::FakeRunner;
use wb_store::MemoryDocStore;
use wb_sync::ObjectStore;

pub fn test_config(work_root: &Path) -> Config {
    Config {
        work_root: work_root.to_path_buf(),
        work_prefix_template: "{projectId}/{workspaceId}".into(),
        events_heartbeat: Duration::from_secs(15),
        reconnect_backoff: Duration::from_millis(10),
        run_command_timeout: Duration::from_secs(30),
        read_file_max_bytes: 200_000,
        output_max_bytes: 50_000,
        sync_on_start: true,
        sync_interval: Duration::from_secs(15),
        enable_upload: true,
        download_concurrency: 4,
        upload_concurrency: 4,
        shutdown_timeout: Duration::from_secs(1),
        auth_token: None,
        upstream_url: None,
        upstream_audience: None,
        upstream_token: None,
        consumer_image: "workbridge:test".into(),
        consumer_port: 8080,
        consumer_base_url: None,
        sync_bucket: None,
        sync_prefix_template: "{userId}/{projectId}/{workspaceId}".into(),
        idle_watchdog: Duration::from_secs(120),
        default_lease_ms: 60_000,
        workspace_ttl_ms: 300_000,
    }
}

pub fn test_ctx(work_root: &Path) -> (SharedCtx, FakeRunner) {
    test_ctx_with(test_config(work_root), None)
}

pub fn test_ctx_with(
    config: Config,
    objects: Option<Arc<dyn ObjectStore>>,
) -> (SharedCtx, FakeRunner) {
    let runner = FakeRunner::new();
    let store = Arc::new(MemoryDocStore::new());
    let ctx = Arc::new(AppCtx::new(store, Arc::new(runner.clone()), objects, config));
    (ctx, runner)
}
