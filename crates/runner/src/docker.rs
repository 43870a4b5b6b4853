// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker adapter — local-sandbox mode.
//!
//! Workloads run as detached containers managed through the Docker CLI.
//! The consumer sidecar joins a per-pair bridge network so the producer
//! can reach it by container name; the exit monitor is a blocking
//! `docker wait` on the producer.

use crate::{LaunchHandle, LaunchSpec, RunnerAdapter, RunnerError};
use async_trait::async_trait;
use tracing::{info, warn};
use wb_core::RunnerMode;

#[derive(Debug, Clone, Default)]
pub struct DockerRunner;

impl DockerRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run_detached(&self, spec: &LaunchSpec, network: Option<&str>) -> Result<(), RunnerError> {
        let mut args: Vec<String> =
            vec!["run".into(), "-d".into(), "--name".into(), spec.name.clone()];
        if let Some(network) = network {
            args.push("--network".into());
            args.push(network.to_string());
        }
        for (k, v) in &spec.env {
            args.push("-e".into());
            args.push(format!("{}={}", k, v));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        run_docker(&args).await.map_err(RunnerError::LaunchFailed)?;
        info!(name = %spec.name, image = %spec.image, "container started");
        Ok(())
    }
}

#[async_trait]
impl RunnerAdapter for DockerRunner {
    async fn launch(
        &self,
        producer: LaunchSpec,
        sidecar: Option<LaunchSpec>,
    ) -> Result<LaunchHandle, RunnerError> {
        let network = format!("{}-net", producer.name);
        let consumer_name = sidecar.as_ref().map(|s| s.name.clone());

        if sidecar.is_some() {
            run_docker(&["network".into(), "create".into(), network.clone()])
                .await
                .map_err(RunnerError::LaunchFailed)?;
        }

        // Sidecar first: the producer's consumer base URL must resolve
        // before the producer connects upstream.
        if let Some(ref sidecar) = sidecar {
            if let Err(e) = self.run_detached(sidecar, Some(&network)).await {
                let _ = run_docker(&["network".into(), "rm".into(), network.clone()]).await;
                return Err(e);
            }
        }

        let producer_network = sidecar.is_some().then_some(network.as_str());
        if let Err(e) = self.run_detached(&producer, producer_network).await {
            // Producer failed after the sidecar came up: tear the sidecar
            // back down so nothing is left running unobserved.
            if let Some(ref name) = consumer_name {
                let _ = self.stop(name).await;
                let _ = run_docker(&["network".into(), "rm".into(), network.clone()]).await;
            }
            return Err(e);
        }

        Ok(LaunchHandle {
            producer_name: producer.name,
            consumer_name,
            remote_op: None,
        })
    }

    async fn stop(&self, name: &str) -> Result<(), RunnerError> {
        match run_docker(&["rm".into(), "-f".into(), name.to_string()]).await {
            Ok(_) => Ok(()),
            Err(e) if e.contains("No such container") => Ok(()),
            Err(e) => {
                warn!(name, error = %e, "container stop failed");
                Err(RunnerError::Backend(e))
            }
        }
    }

    async fn wait(&self, name: &str) -> Result<Option<i32>, RunnerError> {
        let out = run_docker(&["wait".into(), name.to_string()])
            .await
            .map_err(|e| {
                if e.contains("No such container") {
                    RunnerError::NotFound(name.to_string())
                } else {
                    RunnerError::Backend(e)
                }
            })?;
        Ok(out.trim().parse::<i32>().ok())
    }

    fn mode(&self) -> RunnerMode {
        RunnerMode::LocalSandbox
    }
}

/// Run a docker CLI command and return stdout on success.
async fn run_docker(args: &[String]) -> Result<String, String> {
    let output = tokio::process::Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to exec docker: {}", e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "docker {} failed: {}",
            args.first().map(String::as_str).unwrap_or(""),
            stderr.trim()
        ))
    }
}
