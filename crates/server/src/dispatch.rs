// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event → tool dispatch.
//!
//! Every dispatched event produces exactly one [`ToolResult`]. Handler
//! failures — unknown tool, bad arguments, path escapes, missing files —
//! are folded into the result's `error` field; from the stream's point of
//! view they are successes and the cursor advances.

use crate::state::Config;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info_span, Instrument};
use wb_core::{Scope, ToolEvent};
use wb_core::ToolResult;
use wb_sandbox::workroot::PrefixVars;

/// Compute the per-request work root under the configured mount.
pub fn derive_work_root(
    config: &Config,
    scope: &Scope,
    workspace_id: &str,
    session_id: Option<&str>,
) -> PathBuf {
    let vars = PrefixVars {
        user_id: scope.user_id(),
        project_id: scope.project_id(),
        workspace_id,
        session_id: session_id.unwrap_or(""),
    };
    let prefix = wb_sandbox::render_prefix(&config.work_prefix_template, &vars);
    config.work_root.join(prefix)
}

/// Dispatch one event and build its result.
pub async fn dispatch_event(
    config: &Config,
    scope: &Scope,
    workspace_id: &str,
    session_id: Option<&str>,
    event: &ToolEvent,
) -> ToolResult {
    let tool = event.tool_call.function.name.clone();
    let span = info_span!("dispatch.tool", event_id = %event.id, tool = %tool, scope = %scope);
    run_tool(config, scope, workspace_id, session_id, event).instrument(span).await
}

async fn run_tool(
    config: &Config,
    scope: &Scope,
    workspace_id: &str,
    session_id: Option<&str>,
    event: &ToolEvent,
) -> ToolResult {
    // Arguments arrive as an object or as a JSON-encoded string.
    let args = match &event.tool_call.function.arguments {
        None => json!({}),
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => parsed,
            Err(_) => return ToolResult::err(event, json!({}), "bad_arguments"),
        },
        Some(_) => return ToolResult::err(event, json!({}), "bad_arguments"),
    };

    let work_root = derive_work_root(config, scope, workspace_id, session_id);
    if tokio::fs::create_dir_all(&work_root).await.is_err() {
        return ToolResult::err(event, args, "workroot_unavailable");
    }

    let str_arg = |key: &str| args.get(key).and_then(Value::as_str).map(str::to_string);

    match event.tool_call.function.name.as_str() {
        "READ_FILE" => {
            let Some(filepath) = str_arg("filepath") else {
                return ToolResult::err(event, args, "bad_arguments");
            };
            match wb_sandbox::read_file(&work_root, &filepath, config.read_file_max_bytes).await {
                Ok(out) => ToolResult::ok(event, args, to_json(&out)),
                Err(e) => ToolResult::err(event, args, e.to_string()),
            }
        }
        "UPDATE_FILE" => {
            let (Some(filepath), Some(content)) = (str_arg("filepath"), str_arg("content")) else {
                return ToolResult::err(event, args, "bad_arguments");
            };
            match wb_sandbox::update_file(&work_root, &filepath, &content).await {
                Ok(out) => ToolResult::ok(event, args, to_json(&out)),
                Err(e) => ToolResult::err(event, args, e.to_string()),
            }
        }
        "RUN_COMMAND" => {
            let Some(command) = str_arg("command") else {
                return ToolResult::err(event, args, "bad_arguments");
            };
            // Timeouts are part of the outcome, not errors.
            let out = wb_sandbox::run_command(
                &work_root,
                &command,
                config.run_command_timeout,
                config.output_max_bytes,
            )
            .await;
            ToolResult::ok(event, args, to_json(&out))
        }
        _ => ToolResult::err(event, args, "unknown_tool"),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| json!({}))
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
