// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wb-runner: producer/consumer workload launchers.
//!
//! The orchestration layer composes [`LaunchSpec`]s; an adapter turns them
//! into running workloads. Local mode drives the Docker CLI, remote mode
//! creates a Kubernetes Job. Both expose the same three verbs: launch,
//! stop, wait.

pub mod docker;
pub mod k8s;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;
use wb_core::RunnerMode;

pub use docker::DockerRunner;
pub use k8s::KubeRunner;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRunner;

/// Container/Job name length limit shared by Docker and Kubernetes.
pub const NAME_MAX: usize = 63;

/// Build a workload name `prefix-<consumer_id>` truncated to [`NAME_MAX`].
pub fn workload_name(prefix: &str, consumer_id: &str) -> String {
    let mut name = format!("{}-{}", prefix, consumer_id);
    name.truncate(NAME_MAX);
    name
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("workload not found: {0}")]
    NotFound(String),

    #[error("runner backend error: {0}")]
    Backend(String),
}

/// One workload to start: image, name, environment, optional command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    /// Entrypoint override; the image default runs when empty.
    pub command: Vec<String>,
}

/// Names of what a launch brought up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchHandle {
    pub producer_name: String,
    pub consumer_name: Option<String>,
    /// Remote operation handle (Job name) in remote mode.
    pub remote_op: Option<String>,
}

#[async_trait]
pub trait RunnerAdapter: Send + Sync {
    /// Start the consumer sidecar (when given) and then the producer.
    /// A producer failure tears the sidecar back down before returning.
    async fn launch(
        &self,
        producer: LaunchSpec,
        sidecar: Option<LaunchSpec>,
    ) -> Result<LaunchHandle, RunnerError>;

    /// Stop and remove a workload by name. Idempotent; stopping an absent
    /// workload is not an error.
    async fn stop(&self, name: &str) -> Result<(), RunnerError>;

    /// Block until the named producer workload terminates. Returns the
    /// exit code when the backend reports one.
    async fn wait(&self, name: &str) -> Result<Option<i32>, RunnerError>;

    fn mode(&self) -> RunnerMode;
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
