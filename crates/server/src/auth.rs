// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity extraction and the optional bearer-token gate.
//!
//! Tenancy travels as `x-user-id` / `x-project-id` headers, with
//! `userId` / `projectId` query parameters as the fallback for clients
//! that cannot set headers. When `WB_AUTH_TOKEN` is configured, privileged
//! endpoints additionally require the matching bearer token.

use crate::error::ApiError;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use std::collections::HashMap;
use wb_core::Scope;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// Resolve the tenant scope from headers or query parameters.
pub fn scope_from(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Scope, ApiError> {
    let user = header(headers, "x-user-id")
        .or_else(|| query.get("userId").cloned())
        .unwrap_or_default();
    let project = header(headers, "x-project-id")
        .or_else(|| query.get("projectId").cloned())
        .unwrap_or_default();
    Ok(Scope::new(user, project)?)
}

/// Session id, if the caller supplied one.
pub fn session_from(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    header(headers, "x-session-id").or_else(|| query.get("sessionId").cloned())
}

/// Enforce the bearer token on privileged endpoints. A server without a
/// configured token trusts its network.
pub fn require_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else { return Ok(()) };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Auth("missing or invalid bearer token".into())),
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
