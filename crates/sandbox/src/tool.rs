// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool handlers: `READ_FILE`, `UPDATE_FILE`, `RUN_COMMAND`.
//!
//! A handler error is a tool-level outcome, not a transport failure — the
//! dispatcher folds it into the result frame and the event still advances
//! the cursor. Error display strings are wire-visible (`path_escape`,
//! `not_found`), so they stay short and stable.

use crate::workroot::resolve_within;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Grace between SIGTERM and SIGKILL for a timed-out command.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("path_escape")]
    PathEscape,

    #[error("not_found")]
    NotFound,

    #[error("io: {0}")]
    Io(String),
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound,
            _ => ToolError::Io(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadFileOutput {
    pub ok: bool,
    pub filepath: String,
    pub content: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileOutput {
    pub ok: bool,
    pub filepath: String,
    pub bytes: u64,
    pub mtime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: String,
    pub timeout_ms: u64,
}

/// Read a file inside the work root, capped at `max_bytes`.
///
/// A file of exactly `max_bytes` is not truncated; one byte more is.
pub async fn read_file(
    work_root: &Path,
    filepath: &str,
    max_bytes: usize,
) -> Result<ReadFileOutput, ToolError> {
    let path = resolve_within(work_root, filepath)?;
    let bytes = tokio::fs::read(&path).await?;
    let truncated = bytes.len() > max_bytes;
    let capped = if truncated { &bytes[..max_bytes] } else { &bytes[..] };
    Ok(ReadFileOutput {
        ok: true,
        filepath: filepath.to_string(),
        content: String::from_utf8_lossy(capped).into_owned(),
        truncated,
    })
}

/// Write a file inside the work root, creating parent directories.
///
/// The write lands in a `.tmp` sibling first and is renamed over the
/// target, so a concurrent read sees either the old or the new content.
pub async fn update_file(
    work_root: &Path,
    filepath: &str,
    content: &str,
) -> Result<UpdateFileOutput, ToolError> {
    let path = resolve_within(work_root, filepath)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    tokio::fs::write(&tmp, content.as_bytes()).await?;
    tokio::fs::rename(&tmp, &path).await?;

    let meta = tokio::fs::metadata(&path).await?;
    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Ok(UpdateFileOutput {
        ok: true,
        filepath: filepath.to_string(),
        bytes: content.len() as u64,
        mtime_ms,
    })
}

/// Run a shell command with the work root as its working directory.
///
/// The command runs under `bash -lc`. Combined stdout+stderr is captured
/// into a tail buffer of `output_cap` bytes (oldest bytes dropped). On
/// timeout the child gets SIGTERM, then SIGKILL after [`KILL_GRACE`];
/// `exit_code` is `None` and `error` is `"timeout"`.
pub async fn run_command(work_root: &Path, command: &str, timeout: Duration, output_cap: usize) -> CommandOutcome {
    let timeout_ms = timeout.as_millis() as u64;
    let fail = |message: String| CommandOutcome {
        exit_code: None,
        output: String::new(),
        error: message,
        timeout_ms,
    };

    let mut child = match Command::new("bash")
        .arg("-lc")
        .arg(command)
        .current_dir(work_root)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return fail(format!("spawn failed: {}", e)),
    };

    let tail = Arc::new(Mutex::new(TailBuf::new(output_cap)));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(drain(stdout, Arc::clone(&tail))));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(drain(stderr, Arc::clone(&tail))));
    }

    let (exit_code, error) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (status.code(), String::new()),
        Ok(Err(e)) => (None, format!("wait failed: {}", e)),
        Err(_) => {
            terminate(&mut child).await;
            (None, "timeout".to_string())
        }
    };

    for reader in readers {
        let _ = reader.await;
    }

    let output = tail.lock().take();
    debug!(exit_code = ?exit_code, output_bytes = output.len(), "command finished");
    CommandOutcome { exit_code, output, error, timeout_ms }
}

/// SIGTERM, a grace period, then SIGKILL.
async fn terminate(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
            warn!(error = %e, "SIGTERM failed");
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "SIGKILL failed");
    }
}

async fn drain(mut reader: impl AsyncReadExt + Unpin, tail: Arc<Mutex<TailBuf>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => tail.lock().push(&chunk[..n]),
        }
    }
}

/// Byte buffer keeping only the newest `cap` bytes.
struct TailBuf {
    cap: usize,
    buf: Vec<u8>,
}

impl TailBuf {
    fn new(cap: usize) -> Self {
        Self { cap, buf: Vec::new() }
    }

    fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.cap {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.cap..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.cap {
            let excess = self.buf.len() - self.cap;
            self.buf.drain(..excess);
        }
    }

    fn take(&mut self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
