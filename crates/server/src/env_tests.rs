// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn with_env<R>(pairs: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    for (k, v) in pairs {
        std::env::set_var(k, v);
    }
    let out = f();
    for (k, _) in pairs {
        std::env::remove_var(k);
    }
    out
}

#[test]
#[serial]
fn defaults_without_overrides() {
    assert_eq!(work_root(), PathBuf::from("/mnt/work"));
    assert_eq!(work_prefix_template(), "{projectId}/{workspaceId}");
    assert_eq!(events_heartbeat(), Duration::from_millis(15_000));
    assert_eq!(reconnect_backoff(), Duration::from_millis(1_000));
    assert_eq!(run_command_timeout(), Duration::from_secs(120));
    assert_eq!(read_file_max_bytes(), 200_000);
    assert_eq!(output_max_bytes(), 50_000);
    assert!(sync_on_start());
    assert_eq!(sync_interval(), Duration::from_millis(15_000));
    assert!(gcs_enable_upload());
    assert_eq!(gcs_download_concurrency(), 4);
    assert_eq!(gcs_upload_concurrency(), 4);
}

#[test]
#[serial]
fn overrides_parse() {
    with_env(
        &[
            ("WORK_ROOT", "/tmp/wb"),
            ("RUN_COMMAND_TIMEOUT_SECONDS", "2"),
            ("READ_FILE_MAX_BYTES", "100"),
            ("SYNC_ON_START", "0"),
            ("GCS_ENABLE_UPLOAD", "false"),
        ],
        || {
            assert_eq!(work_root(), PathBuf::from("/tmp/wb"));
            assert_eq!(run_command_timeout(), Duration::from_secs(2));
            assert_eq!(read_file_max_bytes(), 100);
            assert!(!sync_on_start());
            assert!(!gcs_enable_upload());
        },
    );
}

#[test]
#[serial]
fn garbage_numbers_fall_back_to_defaults() {
    with_env(&[("READ_FILE_MAX_BYTES", "not-a-number")], || {
        assert_eq!(read_file_max_bytes(), 200_000);
    });
}

#[test]
#[serial]
fn state_dir_resolution_order() {
    with_env(&[("WB_STATE_DIR", "/var/lib/wb")], || {
        assert_eq!(state_dir().unwrap(), PathBuf::from("/var/lib/wb"));
    });
    with_env(&[("XDG_STATE_HOME", "/xdg"), ("HOME", "/home/u")], || {
        assert_eq!(state_dir().unwrap(), PathBuf::from("/xdg/workbridge"));
    });
}

#[test]
#[serial]
fn auth_token_empty_means_unset() {
    with_env(&[("WB_AUTH_TOKEN", "")], || {
        assert!(auth_token().is_none());
    });
    with_env(&[("WB_AUTH_TOKEN", "secret")], || {
        assert_eq!(auth_token().as_deref(), Some("secret"));
    });
}
