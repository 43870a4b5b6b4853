// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec fixtures: an in-process bridge with fakes at the seams.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wb_runner::FakeRunner;
use wb_server::{router, AppCtx, Config};
use wb_store::MemoryDocStore;
use wb_sync::{MemoryObjectStore, ObjectStore};

pub struct Bridge {
    pub router: Router,
    pub runner: FakeRunner,
    pub objects: Arc<MemoryObjectStore>,
    #[allow(dead_code)]
    pub ctx: wb_server::SharedCtx,
}

pub fn config(work_root: &Path) -> Config {
    Config {
        work_root: work_root.to_path_buf(),
        work_prefix_template: "{projectId}/{workspaceId}".into(),
        events_heartbeat: Duration::from_secs(15),
        reconnect_backoff: Duration::from_millis(10),
        run_command_timeout: Duration::from_secs(2),
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

/// A bridge over a temp mount, optionally wired to the object store.
pub fn bridge_with(config: Config, with_objects: bool) -> Bridge {
    let runner = FakeRunner::new();
    let objects = Arc::new(MemoryObjectStore::new());
    let store = Arc::new(MemoryDocStore::new());
    let ctx = Arc::new(AppCtx::new(
        store,
        Arc::new(runner.clone()),
        with_objects.then(|| objects.clone() as Arc<dyn ObjectStore>),
        config,
    ));
    Bridge { router: router(ctx.clone()), runner, objects, ctx }
}

pub fn bridge(work_root: &Path) -> Bridge {
    bridge_with(config(work_root), false)
}

impl Bridge {
    /// One request through the router; identity headers attached.
    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (u16, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-user-id", "u1")
            .header("x-project-id", "p1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = self.request(req).await;
        let status = resp.status().as_u16();
        (status, read_json(resp).await)
    }

    pub async fn get(&self, uri: &str) -> (u16, Value) {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-user-id", "u1")
            .header("x-project-id", "p1")
            .body(Body::empty())
            .unwrap();
        let resp = self.request(req).await;
        let status = resp.status().as_u16();
        (status, read_json(resp).await)
    }

    /// Push an NDJSON event batch through `/sessions/stream` and return
    /// the parsed response lines.
    pub async fn stream(&self, session: &str, lines: &[Value]) -> Vec<Value> {
        let mut body = String::new();
        for line in lines {
            body.push_str(&line.to_string());
            body.push('\n');
        }
        let req = Request::builder()
            .method("POST")
            .uri("/sessions/stream")
            .header("x-user-id", "u1")
            .header("x-project-id", "p1")
            .header("x-session-id", session)
            .header("content-type", "application/x-ndjson")
            .body(Body::from(body))
            .unwrap();
        let resp = self.request(req).await;
        assert_eq!(resp.status().as_u16(), 200, "stream endpoint should accept");
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

pub async fn read_json(resp: Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}

/// NDJSON event helper.
pub fn event(id: &str, tool: &str, args: Value) -> Value {
    serde_json::json!({
        "id": id,
        "tool_call": {"function": {"name": tool, "arguments": args}},
    })
}
