// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_ctx::{test_config, test_ctx_with};
use serde_json::Value;
use std::sync::Arc;
use wb_sync::MemoryObjectStore;

fn ndjson(lines: &[Value]) -> Body {
    let mut body = String::new();
    for line in lines {
        body.push_str(&line.to_string());
        body.push('\n');
    }
    Body::from(body)
}

async fn collect_lines(mut rx: mpsc::Receiver<String>) -> Vec<Value> {
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(serde_json::from_str(&line).unwrap());
    }
    lines
}

fn event_line(id: &str, tool: &str, args: Value) -> Value {
    serde_json::json!({
        "id": id,
        "tool_call": {"function": {"name": tool, "arguments": args}},
    })
}

#[tokio::test]
async fn push_stream_write_read_list_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _) = test_ctx_with(test_config(dir.path()), None);
    let scope = Scope::new("u1", "p1").unwrap();

    let body = ndjson(&[
        event_line("1", "UPDATE_FILE", serde_json::json!({"filepath": "notes/a.txt", "content": "Hello"})),
        event_line("2", "READ_FILE", serde_json::json!({"filepath": "notes/a.txt"})),
        event_line("3", "RUN_COMMAND", serde_json::json!({"command": "ls -la notes"})),
    ]);

    let (tx, rx) = mpsc::channel(64);
    run_push_stream(ctx, scope, None, "wks-1".into(), body, tx).await;
    let lines = collect_lines(rx).await;

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["event_id"], "1");
    assert_eq!(lines[0]["result"]["ok"], true);
    assert_eq!(lines[0]["result"]["bytes"], 5);
    assert_eq!(lines[1]["event_id"], "2");
    assert_eq!(lines[1]["result"]["content"], "Hello");
    assert_eq!(lines[1]["result"]["truncated"], false);
    assert_eq!(lines[2]["event_id"], "3");
    assert_eq!(lines[2]["result"]["exitCode"], 0);
    assert!(lines[2]["result"]["output"].as_str().unwrap().contains("a.txt"));
}

#[tokio::test]
async fn path_escape_still_advances_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _) = test_ctx_with(test_config(dir.path()), None);
    let scope = Scope::new("u1", "p1").unwrap();

    let body = ndjson(&[
        event_line("1", "READ_FILE", serde_json::json!({"filepath": "../etc/passwd"})),
        event_line("2", "RUN_COMMAND", serde_json::json!({"command": "true"})),
    ]);

    let (tx, rx) = mpsc::channel(64);
    run_push_stream(ctx, scope, None, "wks-1".into(), body, tx).await;
    let lines = collect_lines(rx).await;

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["result"], Value::Null);
    assert_eq!(lines[0]["error"]["message"], "path_escape");
    assert_eq!(lines[1]["result"]["exitCode"], 0);
}

#[tokio::test]
async fn duplicate_event_ids_emit_one_result() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _) = test_ctx_with(test_config(dir.path()), None);
    let scope = Scope::new("u1", "p1").unwrap();

    let body = ndjson(&[
        event_line("1", "RUN_COMMAND", serde_json::json!({"command": "true"})),
        event_line("1", "RUN_COMMAND", serde_json::json!({"command": "true"})),
        event_line("2", "RUN_COMMAND", serde_json::json!({"command": "true"})),
    ]);

    let (tx, rx) = mpsc::channel(64);
    run_push_stream(ctx, scope, None, "wks-1".into(), body, tx).await;
    let lines = collect_lines(rx).await;

    let ids: Vec<_> = lines.iter().map(|l| l["event_id"].as_str().unwrap().to_string()).collect();
    assert_eq!(ids, ["1", "2"]);
}

#[tokio::test]
async fn malformed_lines_are_dropped_without_killing_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _) = test_ctx_with(test_config(dir.path()), None);
    let scope = Scope::new("u1", "p1").unwrap();

    let mut raw = String::from("this is not json\n");
    raw.push_str(&event_line("1", "RUN_COMMAND", serde_json::json!({"command": "true"})).to_string());
    raw.push('\n');

    let (tx, rx) = mpsc::channel(64);
    run_push_stream(ctx, scope, None, "wks-1".into(), Body::from(raw), tx).await;
    let lines = collect_lines(rx).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["event_id"], "1");
}

#[tokio::test]
async fn sync_stats_are_emitted_as_control_lines() {
    let dir = tempfile::tempdir().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    objects.seed("bkt", "u1/p1/wks-1/seeded.txt", "from remote");

    let mut config = test_config(dir.path());
    config.sync_bucket = Some("bkt".into());
    let (ctx, _) = test_ctx_with(config, Some(objects as Arc<dyn wb_sync::ObjectStore>));
    let scope = Scope::new("u1", "p1").unwrap();

    let body = ndjson(&[event_line(
        "1",
        "READ_FILE",
        serde_json::json!({"filepath": "seeded.txt"}),
    )]);

    let (tx, rx) = mpsc::channel(64);
    run_push_stream(ctx, scope, None, "wks-1".into(), body, tx).await;
    let lines = collect_lines(rx).await;

    // Initial sync line, the read result (seeing the downloaded file),
    // then the final sync line.
    assert_eq!(lines[0]["type"], "gcs_sync");
    assert_eq!(lines[0]["downloaded"], 1);
    let read = lines.iter().find(|l| l["event_id"] == "1").unwrap();
    assert_eq!(read["result"]["content"], "from remote");
    let last = lines.last().unwrap();
    assert_eq!(last["type"], "gcs_sync");
    assert_eq!(last["downloaded"], 0);
    assert_eq!(last["conflicts"], 0);
}
