// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-streaming specs over `/sessions/stream`.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn write_read_list_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    let lines = bridge
        .stream(
            "s1",
            &[
                event("1", "UPDATE_FILE", json!({"filepath": "notes/a.txt", "content": "Hello"})),
                event("2", "READ_FILE", json!({"filepath": "notes/a.txt"})),
                event("3", "RUN_COMMAND", json!({"command": "ls -la notes"})),
            ],
        )
        .await;

    assert_eq!(lines.len(), 3, "one result line per event: {lines:?}");
    assert_eq!(lines[0]["event_id"], "1");
    assert_eq!(lines[0]["result"]["ok"], true);
    assert_eq!(lines[0]["result"]["filepath"], "notes/a.txt");
    assert_eq!(lines[0]["result"]["bytes"], 5);

    assert_eq!(lines[1]["event_id"], "2");
    assert_eq!(lines[1]["result"]["content"], "Hello");
    assert_eq!(lines[1]["result"]["truncated"], false);

    assert_eq!(lines[2]["event_id"], "3");
    assert_eq!(lines[2]["result"]["exitCode"], 0);
    assert!(lines[2]["result"]["output"].as_str().unwrap().contains("a.txt"));
    assert_eq!(lines[2]["result"]["error"], "");
}

#[tokio::test]
async fn path_escape_reads_nothing_and_advances() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    let lines = bridge
        .stream(
            "s1",
            &[
                event("1", "READ_FILE", json!({"filepath": "../etc/passwd"})),
                event("2", "RUN_COMMAND", json!({"command": "true"})),
            ],
        )
        .await;

    assert_eq!(lines[0]["result"], serde_json::Value::Null);
    assert_eq!(lines[0]["error"]["message"], "path_escape");
    // The next event was still dispatched.
    assert_eq!(lines[1]["event_id"], "2");
    assert_eq!(lines[1]["result"]["exitCode"], 0);
}

#[tokio::test]
async fn run_command_timeout_bounds_wall_time() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path()); // run_command_timeout = 2s

    let started = std::time::Instant::now();
    let lines = bridge
        .stream("s1", &[event("1", "RUN_COMMAND", json!({"command": "sleep 999"}))])
        .await;
    assert!(started.elapsed() < std::time::Duration::from_secs(4));

    assert_eq!(lines[0]["result"]["exitCode"], serde_json::Value::Null);
    assert_eq!(lines[0]["result"]["error"], "timeout");
    assert_eq!(lines[0]["result"]["timeoutMs"], 2000);
    assert_eq!(lines[0]["error"], serde_json::Value::Null);
}

#[tokio::test]
async fn sessions_reuse_their_workspace_across_requests() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = bridge(dir.path());

    bridge
        .stream("s1", &[event("1", "UPDATE_FILE", json!({"filepath": "keep.txt", "content": "v"}))])
        .await;
    // Same session, new request: the file is still there.
    let lines = bridge
        .stream("s1", &[event("2", "READ_FILE", json!({"filepath": "keep.txt"}))])
        .await;
    assert_eq!(lines[0]["result"]["content"], "v");

    // A different session gets a different work root.
    let lines = bridge
        .stream("s2", &[event("3", "READ_FILE", json!({"filepath": "keep.txt"}))])
        .await;
    assert_eq!(lines[0]["error"]["message"], "not_found");
}
