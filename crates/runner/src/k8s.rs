// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes adapter — remote-job mode.
//!
//! The producer (and its consumer sidecar, when requested) run as the
//! containers of a single Job with no retries. Waiting is a watch for the
//! Job's completion condition; the per-container exit code is not
//! surfaced by the Job API, so `wait` reports `None`.

use crate::{LaunchHandle, LaunchSpec, RunnerAdapter, RunnerError};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use tracing::{info, warn};
use wb_core::RunnerMode;

/// Finished Jobs linger briefly for postmortem inspection.
const JOB_TTL_SECONDS: i32 = 600;

#[derive(Debug, Clone)]
pub struct KubeRunner {
    namespace: String,
}

impl KubeRunner {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }

    async fn jobs(&self) -> Result<Api<Job>, RunnerError> {
        let client = kube::Client::try_default()
            .await
            .map_err(|e| RunnerError::Backend(format!("kube client: {}", e)))?;
        Ok(Api::namespaced(client, &self.namespace))
    }
}

#[async_trait]
impl RunnerAdapter for KubeRunner {
    async fn launch(
        &self,
        producer: LaunchSpec,
        sidecar: Option<LaunchSpec>,
    ) -> Result<LaunchHandle, RunnerError> {
        let job = build_job(&producer, sidecar.as_ref());
        let jobs = self.jobs().await?;
        jobs.create(&PostParams::default(), &job)
            .await
            .map_err(|e| RunnerError::LaunchFailed(format!("job create: {}", e)))?;
        info!(job = %producer.name, namespace = %self.namespace, "job created");

        Ok(LaunchHandle {
            remote_op: Some(producer.name.clone()),
            consumer_name: sidecar.map(|s| s.name),
            producer_name: producer.name,
        })
    }

    async fn stop(&self, name: &str) -> Result<(), RunnerError> {
        let jobs = self.jobs().await?;
        match jobs.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => {
                warn!(job = name, error = %e, "job delete failed");
                Err(RunnerError::Backend(e.to_string()))
            }
        }
    }

    async fn wait(&self, name: &str) -> Result<Option<i32>, RunnerError> {
        let jobs = self.jobs().await?;
        await_condition(jobs, name, conditions::is_job_completed())
            .await
            .map_err(|e| RunnerError::Backend(format!("job watch: {}", e)))?;
        Ok(None)
    }

    fn mode(&self) -> RunnerMode {
        RunnerMode::RemoteJob
    }
}

fn build_job(producer: &LaunchSpec, sidecar: Option<&LaunchSpec>) -> Job {
    let mut containers = vec![container(producer)];
    if let Some(sidecar) = sidecar {
        containers.push(container(sidecar));
    }

    Job {
        metadata: ObjectMeta {
            name: Some(producer.name.clone()),
            labels: Some(
                [("app".to_string(), "workbridge".to_string())].into_iter().collect(),
            ),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(JOB_TTL_SECONDS),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers,
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn container(spec: &LaunchSpec) -> Container {
    Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        env: Some(
            spec.env
                .iter()
                .map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.clone()), ..Default::default() })
                .collect(),
        ),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "k8s_tests.rs"]
mod tests;
