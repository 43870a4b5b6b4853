// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-process runner for tests.

use crate::{LaunchHandle, LaunchSpec, RunnerAdapter, RunnerError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use wb_core::RunnerMode;

#[derive(Default)]
struct FakeState {
    launches: Vec<(LaunchSpec, Option<LaunchSpec>)>,
    stopped: Vec<String>,
    exits: HashMap<String, Option<i32>>,
    fail_next: Option<String>,
}

/// Records launches and lets tests decide when workloads exit.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<FakeState>>,
    exit_signal: Arc<Notify>,
    mode: Option<RunnerMode>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: RunnerMode) -> Self {
        Self { mode: Some(mode), ..Self::default() }
    }

    /// Make the next launch fail with `message`.
    pub fn fail_next_launch(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    /// Mark a workload as exited; any pending `wait` resolves.
    pub fn complete(&self, name: &str, exit_code: Option<i32>) {
        self.state.lock().exits.insert(name.to_string(), exit_code);
        self.exit_signal.notify_waiters();
    }

    pub fn launches(&self) -> Vec<(LaunchSpec, Option<LaunchSpec>)> {
        self.state.lock().launches.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().stopped.clone()
    }
}

#[async_trait]
impl RunnerAdapter for FakeRunner {
    async fn launch(
        &self,
        producer: LaunchSpec,
        sidecar: Option<LaunchSpec>,
    ) -> Result<LaunchHandle, RunnerError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(RunnerError::LaunchFailed(message));
        }
        let handle = LaunchHandle {
            producer_name: producer.name.clone(),
            consumer_name: sidecar.as_ref().map(|s| s.name.clone()),
            remote_op: matches!(self.mode(), RunnerMode::RemoteJob)
                .then(|| producer.name.clone()),
        };
        state.launches.push((producer, sidecar));
        Ok(handle)
    }

    async fn stop(&self, name: &str) -> Result<(), RunnerError> {
        self.state.lock().stopped.push(name.to_string());
        Ok(())
    }

    async fn wait(&self, name: &str) -> Result<Option<i32>, RunnerError> {
        loop {
            let notified = self.exit_signal.notified();
            tokio::pin!(notified);
            // Register before checking, so a completion landing in between
            // still wakes this waiter.
            notified.as_mut().enable();
            if let Some(code) = self.state.lock().exits.get(name) {
                return Ok(*code);
            }
            notified.await;
        }
    }

    fn mode(&self) -> RunnerMode {
        self.mode.unwrap_or(RunnerMode::LocalSandbox)
    }
}
