// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer orchestration: start, stop, and the exit monitor.
//!
//! Start is a pipeline — validate, resolve a workspace, take the project
//! lock, compose environments, bring up the workloads (sidecar first),
//! persist the runtime descriptor, install the monitor. A failure
//! anywhere after acquisition tears down what started and releases the
//! lock owner-scoped; the clean error path never orphans it.

use crate::env::MAX_LEASE_MS;
use crate::error::ApiError;
use crate::state::SharedCtx;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use wb_core::{
    ConsumerId, ConsumerLock, ConsumerType, RunnerMode, RuntimeInfo, Scope, WorkspaceId,
};
use wb_runner::{workload_name, LaunchHandle, LaunchSpec};
use wb_store::{AcquireOutcome, LockConflict};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRequest {
    pub session_id: Option<String>,
    pub workspace_id: Option<String>,
    pub since_id: Option<String>,
    pub since_time: Option<String>,
    pub lease_ms: Option<u64>,
    pub consumer_image: Option<String>,
    pub consumer_sidecar: bool,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedInfo {
    pub ok: bool,
    pub mode: RunnerMode,
    pub consumer_id: ConsumerId,
    pub workspace_id: WorkspaceId,
    pub lock: ConsumerLock,
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(StartedInfo),
    LockHeld(LockConflict),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RunnerMode>,
    pub results: Vec<StopResult>,
    pub released: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn start(
    ctx: &SharedCtx,
    scope: &Scope,
    req: StartRequest,
) -> Result<StartOutcome, ApiError> {
    let lease_ms = req.lease_ms.unwrap_or(ctx.config.default_lease_ms);
    if lease_ms == 0 || lease_ms > MAX_LEASE_MS {
        return Err(ApiError::BadRequest(format!(
            "leaseMs must be within 1..={}",
            MAX_LEASE_MS
        )));
    }

    let workspace = match req.workspace_id {
        Some(ref id) => {
            let id = WorkspaceId::from_string(id);
            ctx.workspaces
                .heartbeat(scope, &id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("workspace {}", id)))?
        }
        None => {
            ctx.workspaces
                .resolve_or_create(scope, req.session_id.as_deref(), ctx.config.workspace_ttl_ms)
                .await?
        }
    };

    let consumer_id = ConsumerId::new();
    let mode = ctx.runner.mode();
    let consumer_type = match mode {
        RunnerMode::LocalSandbox => ConsumerType::Local,
        RunnerMode::RemoteJob => ConsumerType::Cloud,
    };

    let lock = match ctx.locks.acquire(scope, consumer_id, lease_ms, consumer_type).await? {
        AcquireOutcome::Acquired(lock) => lock,
        AcquireOutcome::Held(conflict) => return Ok(StartOutcome::LockHeld(conflict)),
    };

    // Everything below must release the lock on failure.
    match bring_up(ctx, scope, &req, &workspace.workspace_id, &lock, mode).await {
        Ok(handle) => {
            spawn_exit_monitor(ctx, scope.clone(), lock.consumer_id, handle);
            Ok(StartOutcome::Started(StartedInfo {
                ok: true,
                mode,
                consumer_id: lock.consumer_id,
                workspace_id: workspace.workspace_id,
                lock,
            }))
        }
        Err(e) => {
            ctx.locks.release_quiet(scope, &lock.consumer_id).await;
            Err(e)
        }
    }
}

async fn bring_up(
    ctx: &SharedCtx,
    scope: &Scope,
    req: &StartRequest,
    workspace_id: &WorkspaceId,
    lock: &ConsumerLock,
    mode: RunnerMode,
) -> Result<LaunchHandle, ApiError> {
    let consumer_id = &lock.consumer_id;
    let producer_name = workload_name("producer", consumer_id.as_str());
    let sidecar_name = workload_name("sse-consumer", consumer_id.as_str());

    // The producer's route to its consumer depends on topology: a local
    // sidecar resolves by container name, a remote sidecar shares the pod.
    let consumer_base_url = if req.consumer_sidecar {
        match mode {
            RunnerMode::LocalSandbox => {
                format!("http://{}:{}", sidecar_name, ctx.config.consumer_port)
            }
            RunnerMode::RemoteJob => format!("http://localhost:{}", ctx.config.consumer_port),
        }
    } else {
        ctx.config.consumer_base_url.clone().unwrap_or_default()
    };

    let mut env: Vec<(String, String)> = vec![
        ("WB_CONSUMER_ID".into(), consumer_id.to_string()),
        ("WB_LEASE_MS".into(), lock.lease_ms.to_string()),
        ("WB_USER_ID".into(), scope.user_id().to_string()),
        ("WB_PROJECT_ID".into(), scope.project_id().to_string()),
        ("WB_WORKSPACE_ID".into(), workspace_id.to_string()),
        ("WB_CONSUMER_BASE_URL".into(), consumer_base_url),
    ];
    if let Some(ref url) = ctx.config.upstream_url {
        env.push(("WB_UPSTREAM_URL".into(), url.clone()));
    }
    if let Some(ref audience) = ctx.config.upstream_audience {
        env.push(("WB_UPSTREAM_AUDIENCE".into(), audience.clone()));
    }
    if let Some(ref token) = ctx.config.upstream_token {
        env.push(("WB_UPSTREAM_TOKEN".into(), token.clone()));
    }
    if let Some(ref session) = req.session_id {
        env.push(("WB_SESSION_ID".into(), session.clone()));
    }
    if let Some(ref since_id) = req.since_id {
        env.push(("WB_SINCE_ID".into(), since_id.clone()));
    }
    if let Some(ref since_time) = req.since_time {
        env.push(("WB_SINCE_TIME".into(), since_time.clone()));
    }
    for (k, v) in &req.env {
        env.push((k.clone(), v.clone()));
    }

    let image = req.consumer_image.clone().unwrap_or_else(|| ctx.config.consumer_image.clone());
    let producer = LaunchSpec {
        name: producer_name,
        image: image.clone(),
        env: env.clone(),
        command: vec!["wbd".into(), "produce".into()],
    };
    let sidecar = req.consumer_sidecar.then(|| LaunchSpec {
        name: sidecar_name,
        image,
        env,
        command: Vec::new(),
    });

    let handle = ctx.runner.launch(producer, sidecar).await?;

    let runtime = RuntimeInfo {
        mode: Some(mode),
        producer_name: Some(handle.producer_name.clone()),
        consumer_name: handle.consumer_name.clone(),
        consumer_port: Some(ctx.config.consumer_port),
        remote_op: handle.remote_op.clone(),
        stop_requested: false,
        stop_at: None,
    };
    if !ctx.locks.set_runtime(scope, consumer_id, runtime).await? {
        // Lost ownership between acquire and here; whatever started must
        // not keep running unaccounted.
        tear_down(ctx, &handle).await;
        return Err(ApiError::Conflict("lock ownership lost during start".into()));
    }

    info!(scope = %scope, consumer_id = %consumer_id, mode = %mode, "producer started");
    Ok(handle)
}

async fn tear_down(ctx: &SharedCtx, handle: &LaunchHandle) {
    if let Err(e) = ctx.runner.stop(&handle.producer_name).await {
        warn!(name = %handle.producer_name, error = %e, "producer teardown failed");
    }
    if let Some(ref consumer) = handle.consumer_name {
        if let Err(e) = ctx.runner.stop(consumer).await {
            warn!(name = %consumer, error = %e, "consumer teardown failed");
        }
    }
}

/// Wait for the producer to exit, then clean up: stop the sidecar
/// (best-effort) and release the lock owner-scoped.
fn spawn_exit_monitor(
    ctx: &SharedCtx,
    scope: Scope,
    consumer_id: ConsumerId,
    handle: LaunchHandle,
) {
    let runner = ctx.runner.clone();
    let locks = ctx.locks.clone();
    let token = ctx.shutdown.token();
    tokio::spawn(async move {
        tokio::select! {
            // Server shutdown abandons the monitor; the lease expires on
            // its own if the producer dies unobserved.
            _ = token.cancelled() => {}
            exited = runner.wait(&handle.producer_name) => {
                match exited {
                    Ok(code) => info!(producer = %handle.producer_name, exit_code = ?code, "producer exited"),
                    Err(e) => warn!(producer = %handle.producer_name, error = %e, "producer wait failed"),
                }
                if let Some(ref consumer) = handle.consumer_name {
                    if let Err(e) = runner.stop(consumer).await {
                        warn!(name = %consumer, error = %e, "sidecar stop failed");
                    }
                }
                locks.release_quiet(&scope, &consumer_id).await;
            }
        }
    });
}

pub async fn stop(ctx: &SharedCtx, scope: &Scope) -> Result<StopReport, ApiError> {
    let Some(lock) = ctx.locks.get(scope).await? else {
        return Ok(StopReport {
            ok: true,
            mode: None,
            results: Vec::new(),
            released: false,
            message: Some("no active lock".into()),
        });
    };

    let mode = lock.runtime.mode;
    let mut results = Vec::new();

    match mode {
        Some(RunnerMode::RemoteJob) => {
            // The remote job is not awaited: the stop marker plus force
            // release is the contract, and the next acquire may race the
            // dying job until its lease-size window closes.
            ctx.locks.mark_stop(scope).await?;
        }
        _ => {
            let producer = lock
                .runtime
                .producer_name
                .clone()
                .unwrap_or_else(|| workload_name("producer", lock.consumer_id.as_str()));
            let consumer = lock
                .runtime
                .consumer_name
                .clone()
                .unwrap_or_else(|| workload_name("sse-consumer", lock.consumer_id.as_str()));
            for name in [producer, consumer] {
                let stopped = ctx.runner.stop(&name).await;
                results.push(StopResult {
                    name,
                    ok: stopped.is_ok(),
                    error: stopped.err().map(|e| e.to_string()),
                });
            }
        }
    }

    let released = ctx.locks.release(scope, None, true).await?;
    info!(scope = %scope, mode = ?mode, released, "producer stop");
    Ok(StopReport { ok: true, mode, results, released, message: None })
}

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;
