// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server crate.
//!
//! Sandbox and stream knobs keep their legacy unprefixed names; everything
//! deployment specific is `WB_`-prefixed. All accessors fall back to
//! defaults so a bare `wbd serve` comes up on a laptop.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ApiError;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn flag(name: &str, default: bool) -> bool {
    match var(name).as_deref() {
        Some("0") | Some("false") | Some("off") => false,
        Some(_) => true,
        None => default,
    }
}

/// Base sandbox mount all work roots live under.
pub fn work_root() -> PathBuf {
    var("WORK_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/mnt/work"))
}

/// Per-request work-root template; tokens `{userId}`, `{projectId}`,
/// `{workspaceId}`, `{sessionId}`.
pub fn work_prefix_template() -> String {
    var("WORK_PREFIX_TEMPLATE").unwrap_or_else(|| "{projectId}/{workspaceId}".to_string())
}

pub fn events_heartbeat() -> Duration {
    Duration::from_millis(parse_var("EVENTS_HEARTBEAT_MS", 15_000))
}

/// Initial pull-mode reconnect backoff; doubles per failure up to
/// [`RECONNECT_BACKOFF_CAP`].
pub fn reconnect_backoff() -> Duration {
    Duration::from_millis(parse_var("RECONNECT_BACKOFF_MS", 1_000))
}

pub const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(30);

pub fn run_command_timeout() -> Duration {
    Duration::from_secs(parse_var("RUN_COMMAND_TIMEOUT_SECONDS", 120))
}

pub fn read_file_max_bytes() -> usize {
    parse_var("READ_FILE_MAX_BYTES", 200_000)
}

pub fn output_max_bytes() -> usize {
    parse_var("OUTPUT_MAX_BYTES", 50_000)
}

pub fn sync_on_start() -> bool {
    flag("SYNC_ON_START", true)
}

pub fn sync_interval() -> Duration {
    Duration::from_millis(parse_var("SYNC_INTERVAL_MS", 15_000))
}

pub fn gcs_enable_upload() -> bool {
    flag("GCS_ENABLE_UPLOAD", true)
}

pub fn gcs_download_concurrency() -> usize {
    parse_var("GCS_DOWNLOAD_CONCURRENCY", 4)
}

pub fn gcs_upload_concurrency() -> usize {
    parse_var("GCS_UPLOAD_CONCURRENCY", 4)
}

pub fn shutdown_timeout() -> Duration {
    Duration::from_millis(parse_var("SHUTDOWN_TIMEOUT_MS", 10_000))
}

pub fn bind_addr() -> String {
    var("WB_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8334".to_string())
}

/// Resolve state directory: WB_STATE_DIR > XDG_STATE_HOME/workbridge >
/// ~/.local/state/workbridge
pub fn state_dir() -> Result<PathBuf, ApiError> {
    if let Some(dir) = var("WB_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("workbridge"));
    }
    let home = var("HOME").ok_or_else(|| ApiError::Config("no state directory".into()))?;
    Ok(PathBuf::from(home).join(".local/state/workbridge"))
}

/// Bearer token required on privileged endpoints, when set.
pub fn auth_token() -> Option<String> {
    var("WB_AUTH_TOKEN")
}

pub fn upstream_url() -> Option<String> {
    var("WB_UPSTREAM_URL")
}

pub fn upstream_audience() -> Option<String> {
    var("WB_UPSTREAM_AUDIENCE")
}

pub fn upstream_token() -> Option<String> {
    var("WB_UPSTREAM_TOKEN")
}

pub fn consumer_image() -> String {
    var("WB_CONSUMER_IMAGE").unwrap_or_else(|| "workbridge:latest".to_string())
}

pub fn consumer_port() -> u16 {
    parse_var("WB_CONSUMER_PORT", 8080)
}

pub fn consumer_base_url() -> Option<String> {
    var("WB_CONSUMER_BASE_URL")
}

pub fn k8s_namespace() -> String {
    var("WB_K8S_NAMESPACE").unwrap_or_else(|| "default".to_string())
}

/// `docker` (local-sandbox) or `k8s` (remote-job).
pub fn runner_backend() -> String {
    var("WB_RUNNER").unwrap_or_else(|| "docker".to_string())
}

pub fn sync_bucket() -> Option<String> {
    var("WB_SYNC_BUCKET")
}

pub fn sync_prefix_template() -> String {
    var("WB_SYNC_PREFIX").unwrap_or_else(|| "{userId}/{projectId}/{workspaceId}".to_string())
}

pub fn idle_watchdog() -> Duration {
    Duration::from_millis(parse_var("WB_IDLE_WATCHDOG_MS", 120_000))
}

/// Default lock lease. Requests may shorten it; 10 minutes is the cap.
pub fn default_lease_ms() -> u64 {
    parse_var("WB_LOCK_LEASE_MS", 300_000)
}

pub const MAX_LEASE_MS: u64 = 600_000;

pub fn workspace_ttl_ms() -> u64 {
    parse_var("WB_WORKSPACE_TTL_MS", 300_000)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
