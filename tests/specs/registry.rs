// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec registry specs: links, statuses, and the derived tree.

use crate::prelude::*;
use serde_json::json;

async fn seed_lineage(bridge: &Bridge) {
    for (exec, at) in [("A", 1u64), ("B", 2), ("C", 3)] {
        let (status, _) = bridge
            .post_json("/execs/register", json!({"execId": exec, "sessionId": "s1", "createdAt": at}))
            .await;
        assert_eq!(status, 200);
    }
    for (calling, triggered, at) in [("A", "B", 1u64), ("A", "C", 2), ("C", "D", 3)] {
        let (status, _) = bridge
            .post_json(
                "/links/register",
                json!({
                    "callingExecId": calling,
                    "triggeredExecId": triggered,
                    "sessionId": "s1",
                    "createdAt": at,
                }),
            )
            .await;
        assert_eq!(status, 200);
    }
}

#[tokio::test]
async fn tree_builds_single_root_with_ordered_children() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());
    seed_lineage(&bridge).await;

    let (status, forest) = bridge.post_json("/tree", json!({"sessionId": "s1"})).await;
    assert_eq!(status, 200);
    let forest = forest.as_array().unwrap();
    assert_eq!(forest.len(), 1);

    let root = &forest[0];
    assert_eq!(root["execId"], "A");
    let children: Vec<_> = root["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["execId"].as_str().unwrap())
        .collect();
    assert_eq!(children, ["B", "C"]);

    // D has a link but no registration, so C is a leaf.
    let c = &root["children"][1];
    assert!(c["children"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn tree_latest_only_roots_at_newest_registration() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());
    seed_lineage(&bridge).await;

    let (_, forest) = bridge
        .post_json("/tree", json!({"sessionId": "s1", "latestOnly": true}))
        .await;
    let forest = forest.as_array().unwrap();
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0]["execId"], "C");
}

#[tokio::test]
async fn link_queries() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());
    seed_lineage(&bridge).await;

    let (status, links) = bridge.get("/links/by-calling/A").await;
    assert_eq!(status, 200);
    let targets: Vec<_> = links
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["triggeredExec"].as_str().unwrap())
        .collect();
    assert_eq!(targets, ["B", "C"]);

    let (status, link) = bridge.get("/links/by-triggered/C").await;
    assert_eq!(status, 200);
    assert_eq!(link["callingExec"], "A");

    let (status, _) = bridge.get("/links/by-triggered/zzz").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn status_update_merges_into_latest_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());
    seed_lineage(&bridge).await;

    let (status, stored) = bridge
        .post_json(
            "/status/update",
            json!({"execId": "C", "status": "RUNNING", "workflow": {"name": "deploy"}}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(stored["status"], "RUNNING");

    let (status, rows) = bridge.post_json("/status", json!({"sessionId": "s1"})).await;
    assert_eq!(status, 200);
    let rows = rows.as_array().unwrap();
    // Newest first: C, B, A.
    assert_eq!(rows[0]["execId"], "C");
    assert_eq!(rows[0]["status"], "RUNNING");
    assert_eq!(rows[0]["workflow"]["name"], "deploy");
    assert_eq!(rows[1]["execId"], "B");
    assert_eq!(rows[1]["status"], "UNKNOWN");
}

#[tokio::test]
async fn empty_status_update_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    let (status, body) = bridge.post_json("/status/update", json!({"execId": "X"})).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("no fields"));
}

#[tokio::test]
async fn limit_caps_latest_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());
    for i in 0..8u64 {
        bridge
            .post_json(
                "/execs/register",
                json!({"execId": format!("e{i}"), "sessionId": "s1", "createdAt": i}),
            )
            .await;
    }

    let (_, rows) = bridge.post_json("/status", json!({"sessionId": "s1"})).await;
    assert_eq!(rows.as_array().unwrap().len(), 5); // default limit

    let (_, rows) = bridge.post_json("/status", json!({"sessionId": "s1", "limit": 2})).await;
    assert_eq!(rows.as_array().unwrap().len(), 2);
}
