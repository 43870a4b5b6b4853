// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store mirroring through the stream surface.

use crate::prelude::*;
use serde_json::json;

fn synced_bridge(work_root: &std::path::Path) -> Bridge {
    let mut config = config(work_root);
    config.sync_bucket = Some("bkt".into());
    bridge_with(config, true)
}

#[tokio::test]
async fn remote_objects_appear_in_the_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = synced_bridge(dir.path());

    // The sync prefix template is {userId}/{projectId}/{workspaceId}; the
    // workspace id is minted on first use, so seed after discovering it.
    let lines = bridge
        .stream("s1", &[event("1", "RUN_COMMAND", json!({"command": "true"}))])
        .await;
    assert_eq!(lines[0]["type"], "gcs_sync");
    assert_eq!(lines[0]["scannedRemote"], 0);

    let workspace_id = {
        // The only directory under <root>/p1 is the workspace work root.
        let p1 = dir.path().join("p1");
        let entry = std::fs::read_dir(&p1).unwrap().next().unwrap().unwrap();
        entry.file_name().to_string_lossy().into_owned()
    };
    bridge.objects.seed("bkt", &format!("u1/p1/{workspace_id}/pulled.txt"), "remote says hi");

    let lines = bridge
        .stream("s1", &[event("2", "READ_FILE", json!({"filepath": "pulled.txt"}))])
        .await;
    let first = &lines[0];
    assert_eq!(first["type"], "gcs_sync");
    assert_eq!(first["downloaded"], 1);
    let read = lines.iter().find(|l| l["event_id"] == "2").unwrap();
    assert_eq!(read["result"]["content"], "remote says hi");
}

#[tokio::test]
async fn local_writes_are_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = synced_bridge(dir.path());

    let lines = bridge
        .stream(
            "s1",
            &[event("1", "UPDATE_FILE", json!({"filepath": "out.txt", "content": "payload"}))],
        )
        .await;

    // The final sync of the stream uploads the new file.
    let last = lines.last().unwrap();
    assert_eq!(last["type"], "gcs_sync");
    assert_eq!(last["uploaded"], 1);
    assert_eq!(last["conflicts"], 0);

    let p1 = dir.path().join("p1");
    let workspace_id = std::fs::read_dir(&p1)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .file_name()
        .to_string_lossy()
        .into_owned();
    let stored = bridge
        .objects
        .content("bkt", &format!("u1/p1/{workspace_id}/out.txt"))
        .expect("uploaded object");
    assert_eq!(stored, bytes::Bytes::from("payload"));
}

#[tokio::test]
async fn remote_drift_beats_local_edit_and_counts_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = synced_bridge(dir.path());

    // Establish the mirror: write foo.txt and let the final sync push it.
    bridge
        .stream("s1", &[event("1", "UPDATE_FILE", json!({"filepath": "foo.txt", "content": "v1"}))])
        .await;

    let p1 = dir.path().join("p1");
    let workspace_id = std::fs::read_dir(&p1)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .file_name()
        .to_string_lossy()
        .into_owned();
    let object = format!("u1/p1/{workspace_id}/foo.txt");

    // Remote moves to a new generation; the local copy is edited too.
    bridge.objects.seed("bkt", &object, "remote v2");
    let work_root = p1.join(&workspace_id);
    std::fs::write(work_root.join("foo.txt"), "local edit wins?").unwrap();
    let bumped = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
    std::fs::File::options()
        .append(true)
        .open(work_root.join("foo.txt"))
        .unwrap()
        .set_modified(bumped)
        .unwrap();

    let lines = bridge
        .stream("s1", &[event("2", "READ_FILE", json!({"filepath": "foo.txt"}))])
        .await;
    let first = &lines[0];
    assert_eq!(first["type"], "gcs_sync");
    assert_eq!(first["downloaded"], 1);
    assert_eq!(first["uploaded"], 0);
    assert_eq!(first["conflicts"], 1);

    // The remote version replaced the local edit.
    let read = lines.iter().find(|l| l["event_id"] == "2").unwrap();
    assert_eq!(read["result"]["content"], "remote v2");
}
