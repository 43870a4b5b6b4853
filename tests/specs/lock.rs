// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer lifecycle and lock contention specs.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn contended_start_then_release_then_start_again() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    // First start wins the lock.
    let (status, first) = bridge.post_json("/producer/start", json!({})).await;
    assert_eq!(status, 202);
    assert_eq!(first["ok"], true);
    let consumer_id = first["consumerId"].as_str().unwrap().to_string();
    assert!(consumer_id.starts_with("producer-"));
    assert!(first["workspaceId"].as_str().unwrap().starts_with("wks-"));

    // Second start observes the holder.
    let (status, second) = bridge.post_json("/producer/start", json!({})).await;
    assert_eq!(status, 202);
    assert_eq!(second["message"], "Lock held by another consumer");
    assert_eq!(second["details"]["currentConsumerId"], consumer_id.as_str());

    // The producer process exits; the monitor releases the lock.
    bridge.runner.complete(&format!("producer-{}", consumer_id), Some(0));
    let mut released = false;
    for _ in 0..100 {
        let (_, third) = bridge.post_json("/producer/start", json!({})).await;
        if third["ok"] == true {
            released = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(released, "a third start should succeed after producer exit");
}

#[tokio::test]
async fn stop_reports_no_active_lock() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    let (status, body) = bridge.post_json("/producer/stop", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["released"], false);
    assert_eq!(body["message"], "no active lock");
}

#[tokio::test]
async fn stop_tears_down_local_workloads() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    let (_, started) = bridge.post_json("/producer/start", json!({"consumerSidecar": true})).await;
    let consumer_id = started["consumerId"].as_str().unwrap().to_string();

    let (status, report) = bridge.post_json("/producer/stop", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(report["ok"], true);
    assert_eq!(report["released"], true);
    assert_eq!(report["mode"], "local-sandbox");
    let stopped = bridge.runner.stopped();
    assert!(stopped.contains(&format!("producer-{}", consumer_id)));
    assert!(stopped.contains(&format!("sse-consumer-{}", consumer_id)));

    // Idempotent: a second stop is a clean no-op.
    let (status, again) = bridge.post_json("/producer/stop", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(again["released"], false);
}

#[tokio::test]
async fn identity_is_required() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/producer/start")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let resp = bridge.request(req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn bearer_token_gates_privileged_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.auth_token = Some("sesame".into());
    let bridge = bridge_with(config, false);

    let (status, _) = bridge.post_json("/producer/start", json!({})).await;
    assert_eq!(status, 401);

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/producer/start")
        .header("x-user-id", "u1")
        .header("x-project-id", "p1")
        .header("authorization", "Bearer sesame")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let resp = bridge.request(req).await;
    assert_eq!(resp.status().as_u16(), 202);
}

#[tokio::test]
async fn healthz_answers() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());
    let (status, body) = bridge.get("/healthz").await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
}
