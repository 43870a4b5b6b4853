// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event and result wire types.
//!
//! One [`ToolEvent`] arrives per upstream tool call, in either delivery mode
//! (SSE pull or NDJSON push). Exactly one [`ToolResult`] leaves per
//! dispatched event id — as a callback POST in pull mode or a response line
//! in push mode. A tool failure is carried *inside* the result; it is not a
//! transport error.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool-call event from the upstream workflows service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Present in pull mode; the result is POSTed to `/callbacks/{id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    pub tool_call: ToolCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolFunction,
}

/// The upstream serializes `arguments` either as a JSON object or as a
/// JSON-encoded string; normalization happens in the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultErr {
    pub message: String,
}

/// Result record for one dispatched event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    pub tool: ToolName,
    pub args: Value,
    pub result: Option<Value>,
    pub error: Option<ResultErr>,
    pub timestamp: String,
}

impl ToolResult {
    /// Build a success result for an event.
    pub fn ok(event: &ToolEvent, args: Value, result: Value) -> Self {
        Self::build(event, args, Some(result), None)
    }

    /// Build a tool-error result for an event. Still a protocol success.
    pub fn err(event: &ToolEvent, args: Value, message: impl Into<String>) -> Self {
        Self::build(event, args, None, Some(ResultErr { message: message.into() }))
    }

    fn build(event: &ToolEvent, args: Value, result: Option<Value>, error: Option<ResultErr>) -> Self {
        Self {
            event_id: event.id.clone(),
            create_time: event.create_time.clone(),
            tool: ToolName { name: event.tool_call.function.name.clone() },
            args,
            result,
            error,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Replay position in the upstream event channel.
///
/// The id is preferred on resume; wall-clock time is the fallback when no
/// id has been observed yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventCursor {
    pub last_event_id: Option<String>,
    pub last_event_time: Option<String>,
}

impl EventCursor {
    pub fn new(since_id: Option<String>, since_time: Option<String>) -> Self {
        Self { last_event_id: since_id, last_event_time: since_time }
    }

    /// Record a delivered event. Returns false (and leaves the cursor
    /// untouched) when the id is a duplicate of the last delivery, which
    /// happens when the upstream replays across a reconnect.
    pub fn advance(&mut self, event: &ToolEvent) -> bool {
        if self.last_event_id.as_deref() == Some(event.id.as_str()) {
            return false;
        }
        self.last_event_id = Some(event.id.clone());
        if let Some(ref t) = event.create_time {
            self.last_event_time = Some(t.clone());
        }
        true
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
