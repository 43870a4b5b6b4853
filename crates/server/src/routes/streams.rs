// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two stream surfaces.
//!
//! `POST /sessions/stream` is NDJSON both ways: each request line is one
//! tool-call event, each response line is exactly one result record, a
//! `{"type":"ping"}` heartbeat, or a `{"type":"gcs_sync", …}` stats line.
//! `GET /sessions/consume` runs the pull loop against the upstream event
//! channel and delivers results as callbacks; its response carries only
//! keepalives. Results always leave in event-arrival order.

use crate::auth;
use crate::dispatch::{self, derive_work_root};
use crate::error::ApiError;
use crate::sse::SseParser;
use crate::state::{Config, SharedCtx};
use crate::upstream::UpstreamClient;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wb_core::{EventCursor, Scope, ToolEvent, ToolResult, WorkspaceId};
use wb_sync::{ScopedStore, SyncConfig, SyncEngine};

const PING_LINE: &str = "{\"type\":\"ping\"}";

/// `POST /sessions/stream` — push-streaming mode.
pub async fn stream(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Body,
) -> Result<Response, ApiError> {
    auth::require_token(&headers, ctx.config.auth_token.as_deref())?;
    let scope = auth::scope_from(&headers, &query)?;
    let session_id = auth::session_from(&headers, &query);
    let workspace_id = resolve_workspace(&ctx, &scope, &query, session_id.as_deref()).await?;

    let (tx, rx) = mpsc::channel::<String>(64);
    let stream_ctx = ctx.clone();
    tokio::spawn(async move {
        run_push_stream(stream_ctx, scope, session_id, workspace_id, body, tx).await;
    });

    ndjson_response(rx)
}

/// `GET /sessions/consume` — pull+callback mode. The response stays open
/// for the life of the loop and carries keepalive pings only.
pub async fn consume(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    auth::require_token(&headers, ctx.config.auth_token.as_deref())?;
    let scope = auth::scope_from(&headers, &query)?;
    let session_id = auth::session_from(&headers, &query);
    let workspace_id = resolve_workspace(&ctx, &scope, &query, session_id.as_deref()).await?;

    let upstream_url = ctx
        .config
        .upstream_url
        .clone()
        .ok_or_else(|| ApiError::Config("WB_UPSTREAM_URL is not set".into()))?;
    let client = UpstreamClient::new(
        upstream_url,
        ctx.config.upstream_token.clone(),
        ctx.config.upstream_audience.clone(),
    )?;
    let cursor = EventCursor::new(
        query.get("since_id").cloned(),
        query.get("since_time").cloned(),
    );

    let (tx, rx) = mpsc::channel::<String>(64);
    let loop_ctx = ctx.clone();
    tokio::spawn(async move {
        run_pull_loop(loop_ctx, client, scope, session_id, workspace_id, cursor, Some(tx)).await;
    });

    ndjson_response(rx)
}

async fn resolve_workspace(
    ctx: &SharedCtx,
    scope: &Scope,
    query: &HashMap<String, String>,
    session_id: Option<&str>,
) -> Result<String, ApiError> {
    match query.get("workspaceId") {
        Some(id) => {
            let id = WorkspaceId::from_string(id);
            let ws = ctx
                .workspaces
                .heartbeat(scope, &id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("workspace {}", id)))?;
            Ok(ws.workspace_id.to_string())
        }
        None => {
            let ws = ctx
                .workspaces
                .resolve_or_create(scope, session_id, ctx.config.workspace_ttl_ms)
                .await?;
            Ok(ws.workspace_id.to_string())
        }
    }
}

fn ndjson_response(rx: mpsc::Receiver<String>) -> Result<Response, ApiError> {
    let body_stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let line = rx.recv().await?;
        Some((Ok::<Bytes, Infallible>(Bytes::from(line + "\n")), rx))
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::Fatal(e.to_string()))
}

/// Per-stream sync wiring: a narrowed store plus the derived work root.
struct StreamSync {
    engine: SyncEngine,
    root: PathBuf,
}

fn build_sync(
    ctx: &SharedCtx,
    scope: &Scope,
    workspace_id: &str,
    session_id: Option<&str>,
) -> Option<StreamSync> {
    let objects = ctx.objects.clone()?;
    let bucket = ctx.config.sync_bucket.clone()?;
    let vars = wb_sandbox::workroot::PrefixVars {
        user_id: scope.user_id(),
        project_id: scope.project_id(),
        workspace_id,
        session_id: session_id.unwrap_or(""),
    };
    let prefix = wb_sandbox::render_prefix(&ctx.config.sync_prefix_template, &vars);
    let store = ScopedStore::new(objects, bucket, prefix);
    let engine = SyncEngine::new(
        store,
        SyncConfig {
            enable_upload: ctx.config.enable_upload,
            download_concurrency: ctx.config.download_concurrency,
            upload_concurrency: ctx.config.upload_concurrency,
        },
        ctx.sync_gate.clone(),
    );
    let root = derive_work_root(&ctx.config, scope, workspace_id, session_id);
    Some(StreamSync { engine, root })
}

/// Run one sync pass and emit its stats line. Coalesced passes and
/// failures emit nothing; the next interval tries again.
async fn run_sync(sync: &StreamSync, tx: Option<&mpsc::Sender<String>>) {
    match sync.engine.sync(&sync.root).await {
        Ok(Some(stats)) => {
            let mut line = serde_json::to_value(stats).unwrap_or_else(|_| json!({}));
            line["type"] = json!("gcs_sync");
            if let Some(tx) = tx {
                let _ = tx.send(line.to_string()).await;
            }
        }
        Ok(None) => {}
        Err(e) => warn!(root = %sync.root.display(), error = %e, "sync run failed"),
    }
}

/// Dispatch on a worker task so a blocking tool cannot stall the stream's
/// select loop. A crashed worker still produces a result frame.
async fn dispatch_on_worker(
    config: Config,
    scope: Scope,
    workspace_id: String,
    session_id: Option<String>,
    event: ToolEvent,
) -> ToolResult {
    let fallback = event.clone();
    let joined = tokio::spawn(async move {
        dispatch::dispatch_event(&config, &scope, &workspace_id, session_id.as_deref(), &event)
            .await
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(e) => ToolResult::err(&fallback, json!({}), format!("tool task failed: {}", e)),
    }
}

async fn run_push_stream(
    ctx: SharedCtx,
    scope: Scope,
    session_id: Option<String>,
    workspace_id: String,
    body: Body,
    tx: mpsc::Sender<String>,
) {
    let token = ctx.shutdown.token();
    let sync = build_sync(&ctx, &scope, &workspace_id, session_id.as_deref());
    if ctx.config.sync_on_start {
        if let Some(ref sync) = sync {
            run_sync(sync, Some(&tx)).await;
        }
    }

    let mut heartbeat = tokio::time::interval(ctx.config.events_heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await; // the immediate first tick is not a heartbeat
    let mut sync_timer = tokio::time::interval(ctx.config.sync_interval);
    sync_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sync_timer.tick().await;

    let mut cursor = EventCursor::default();
    let mut line_buf = String::new();
    let mut chunks = body.into_data_stream();

    info!(scope = %scope, workspace_id = %workspace_id, "push stream open");
    'stream: loop {
        tokio::select! {
            _ = token.cancelled() => break 'stream,
            _ = heartbeat.tick() => {
                if tx.send(PING_LINE.to_string()).await.is_err() {
                    break 'stream;
                }
            }
            _ = sync_timer.tick(), if sync.is_some() => {
                if let Some(ref sync) = sync {
                    run_sync(sync, Some(&tx)).await;
                }
            }
            chunk = chunks.next() => {
                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        debug!(error = %e, "push stream request body error");
                        break 'stream;
                    }
                    None => break 'stream, // client finished sending
                };
                line_buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let event: ToolEvent = match serde_json::from_str(line) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "unparseable event line dropped");
                            continue;
                        }
                    };
                    if !cursor.advance(&event) {
                        continue; // duplicate id
                    }
                    let result = dispatch_on_worker(
                        ctx.config.clone(),
                        scope.clone(),
                        workspace_id.clone(),
                        session_id.clone(),
                        event,
                    )
                    .await;
                    let encoded = match serde_json::to_string(&result) {
                        Ok(encoded) => encoded,
                        Err(e) => {
                            warn!(error = %e, "result encoding failed");
                            continue;
                        }
                    };
                    if tx.send(encoded).await.is_err() {
                        break 'stream;
                    }
                }
            }
        }
    }

    // Final reconciliation before the work root goes quiet.
    if let Some(ref sync) = sync {
        run_sync(sync, Some(&tx)).await;
    }
    info!(scope = %scope, workspace_id = %workspace_id, "push stream closed");
}

/// The pull+callback loop, shared by `GET /sessions/consume` and
/// `wbd produce`.
///
/// Holds a streaming connection to the upstream channel, dispatches each
/// event, posts callbacks, and reconnects with exponential backoff capped
/// at 30s. Resume prefers the event-id cursor; duplicates replayed across
/// a reconnect are dropped. An idle connection past the watchdog is
/// forced to reconnect.
pub async fn run_pull_loop(
    ctx: SharedCtx,
    client: UpstreamClient,
    scope: Scope,
    session_id: Option<String>,
    workspace_id: String,
    mut cursor: EventCursor,
    tx: Option<mpsc::Sender<String>>,
) {
    let token = ctx.shutdown.token();
    let sync = build_sync(&ctx, &scope, &workspace_id, session_id.as_deref());
    if ctx.config.sync_on_start {
        if let Some(ref sync) = sync {
            run_sync(sync, tx.as_ref()).await;
        }
    }

    let mut heartbeat = tokio::time::interval(ctx.config.events_heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut sync_timer = tokio::time::interval(ctx.config.sync_interval);
    sync_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sync_timer.tick().await;

    let mut backoff = ctx.config.reconnect_backoff;
    info!(scope = %scope, workspace_id = %workspace_id, "pull loop starting");

    'outer: while !token.is_cancelled() {
        let connected = tokio::select! {
            _ = token.cancelled() => break 'outer,
            resp = client.open_events(&scope, session_id.as_deref(), &cursor) => resp,
        };
        let resp = match connected {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, delay_ms = backoff.as_millis() as u64, "event channel down, reconnecting");
                tokio::select! {
                    _ = token.cancelled() => break 'outer,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(crate::env::RECONNECT_BACKOFF_CAP);
                continue;
            }
        };

        debug!(scope = %scope, since_id = ?cursor.last_event_id, "event channel connected");
        let mut frames = Box::pin(resp.bytes_stream());
        let mut parser = SseParser::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break 'outer,
                _ = heartbeat.tick() => {
                    if let Some(ref tx) = tx {
                        if tx.send(PING_LINE.to_string()).await.is_err() {
                            // The consume response is gone; stop pulling.
                            break 'outer;
                        }
                    }
                }
                _ = sync_timer.tick(), if sync.is_some() => {
                    if let Some(ref sync) = sync {
                        run_sync(sync, tx.as_ref()).await;
                    }
                }
                next = tokio::time::timeout(ctx.config.idle_watchdog, frames.next()) => {
                    let bytes = match next {
                        Err(_) => {
                            warn!(scope = %scope, "event channel idle, forcing reconnect");
                            break;
                        }
                        Ok(None) => break,
                        Ok(Some(Err(e))) => {
                            debug!(error = %e, "event channel read error");
                            break;
                        }
                        Ok(Some(Ok(bytes))) => bytes,
                    };
                    for frame in parser.push(&bytes) {
                        if frame.data.is_empty() {
                            continue;
                        }
                        let event: ToolEvent = match serde_json::from_str(&frame.data) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(error = %e, "unparseable event frame dropped");
                                continue;
                            }
                        };
                        if !cursor.advance(&event) {
                            continue; // replayed duplicate
                        }
                        backoff = ctx.config.reconnect_backoff; // healthy again
                        let callback_id = event.callback_id.clone();
                        let result = dispatch_on_worker(
                            ctx.config.clone(),
                            scope.clone(),
                            workspace_id.clone(),
                            session_id.clone(),
                            event,
                        )
                        .await;
                        if let Some(ref callback_id) = callback_id {
                            let outcome = client.post_callback(callback_id, &result).await;
                            debug!(callback_id = %callback_id, outcome = ?outcome, "callback finished");
                        }
                    }
                }
            }
        }

        // Reconnect silently; the cursor re-seeds the subscription.
        tokio::select! {
            _ = token.cancelled() => break 'outer,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(crate::env::RECONNECT_BACKOFF_CAP);
    }

    if let Some(ref sync) = sync {
        run_sync(sync, tx.as_ref()).await;
    }
    info!(scope = %scope, "pull loop stopped");
}

#[cfg(test)]
#[path = "streams_tests.rs"]
mod tests;
