// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the upstream workflows service.
//!
//! Two concerns: holding the long-lived event-channel connection open in
//! pull mode, and posting per-event result callbacks. Callback delivery
//! retries transport conditions only — a 404 means the callback expired
//! upstream and retrying cannot help.

use crate::error::ApiError;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use wb_core::{EventCursor, Scope, ToolResult};

const CALLBACK_ATTEMPTS: u32 = 3;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal state of one callback delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Delivered,
    /// 404: the callback id expired upstream.
    Expired,
    /// Non-retryable 4xx.
    Rejected(u16),
    /// Transport kept failing until attempts ran out.
    Failed(String),
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    audience: Option<String>,
}

impl UpstreamClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        audience: Option<String>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            audience,
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        };
        match self.audience {
            Some(ref audience) => req.header("x-audience", audience),
            None => req,
        }
    }

    /// Open the event channel, resuming from the cursor (id preferred,
    /// time fallback). The response body is the SSE stream.
    pub async fn open_events(
        &self,
        scope: &Scope,
        session_id: Option<&str>,
        cursor: &EventCursor,
    ) -> Result<reqwest::Response, String> {
        let mut req = self
            .http
            .get(format!("{}/events", self.base_url))
            .header("accept", "text/event-stream")
            .header("x-user-id", scope.user_id())
            .header("x-project-id", scope.project_id());
        if let Some(session) = session_id {
            req = req.header("x-session-id", session);
        }
        if let Some(ref id) = cursor.last_event_id {
            req = req.query(&[("since_id", id.as_str())]);
        } else if let Some(ref time) = cursor.last_event_time {
            req = req.query(&[("since_time", time.as_str())]);
        }

        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| format!("event channel connect: {}", e))?;
        resp.error_for_status().map_err(|e| format!("event channel refused: {}", e))
    }

    /// Deliver one result to `/callbacks/{callback_id}`.
    ///
    /// Policy: ≤3 attempts with jittered backoff for transport failures
    /// and 5xx; 404 is terminal; one 400 is retried with the payload
    /// wrapped as `{result: payload}`; other 4xx are terminal.
    pub async fn post_callback(&self, callback_id: &str, result: &ToolResult) -> CallbackOutcome {
        let url = format!("{}/callbacks/{}", self.base_url, callback_id);
        let mut wrapped = false;
        let mut last_error = String::new();

        for attempt in 1..=CALLBACK_ATTEMPTS {
            let payload = if wrapped {
                json!({ "result": result })
            } else {
                match serde_json::to_value(result) {
                    Ok(v) => v,
                    Err(e) => return CallbackOutcome::Failed(format!("encode: {}", e)),
                }
            };
            let sent = self
                .authed(self.http.post(&url))
                .timeout(CALLBACK_TIMEOUT)
                .json(&payload)
                .send()
                .await;

            match sent {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    match status {
                        200..=299 => {
                            debug!(callback_id, attempt, "callback delivered");
                            return CallbackOutcome::Delivered;
                        }
                        404 => return CallbackOutcome::Expired,
                        400 if !wrapped => {
                            // Some upstreams expect the envelope form.
                            wrapped = true;
                            continue;
                        }
                        400..=499 => return CallbackOutcome::Rejected(status),
                        _ => last_error = format!("HTTP {}", status),
                    }
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < CALLBACK_ATTEMPTS {
                let delay = callback_backoff(attempt);
                warn!(callback_id, attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "callback retry");
                tokio::time::sleep(delay).await;
            }
        }
        CallbackOutcome::Failed(last_error)
    }

    /// Best-effort stop notice; part of the bounded shutdown sequence.
    pub async fn notify_stop(&self, scope: &Scope, consumer_id: &str) {
        let url = format!("{}/consumers/{}/stop", self.base_url, consumer_id);
        let req = self
            .authed(self.http.post(&url))
            .timeout(CALLBACK_TIMEOUT)
            .header("x-user-id", scope.user_id())
            .header("x-project-id", scope.project_id());
        if let Err(e) = req.send().await {
            debug!(consumer_id, error = %e, "upstream stop notice failed");
        }
    }
}

fn callback_backoff(attempt: u32) -> Duration {
    let jitter = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()) % 100)
        .unwrap_or(0);
    Duration::from_millis(200 * u64::from(attempt) + jitter)
}
