// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer lifecycle endpoints.

use crate::auth;
use crate::error::ApiError;
use crate::producer::{self, StartOutcome, StartRequest};
use crate::state::SharedCtx;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::HashMap;

/// `POST /producer/start` — both the started and the lock-held outcome
/// are 202: the request was understood, the lock decided the rest.
pub async fn start(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Option<Json<StartRequest>>,
) -> Result<Response, ApiError> {
    auth::require_token(&headers, ctx.config.auth_token.as_deref())?;
    let scope = auth::scope_from(&headers, &query)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    match producer::start(&ctx, &scope, req).await? {
        StartOutcome::Started(info) => Ok((StatusCode::ACCEPTED, Json(info)).into_response()),
        StartOutcome::LockHeld(details) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "message": "Lock held by another consumer",
                "details": details,
            })),
        )
            .into_response()),
    }
}

/// `POST /producer/stop` — idempotent; a missing lock is an ok outcome.
pub async fn stop(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    auth::require_token(&headers, ctx.config.auth_token.as_deref())?;
    let scope = auth::scope_from(&headers, &query)?;
    let report = producer::stop(&ctx, &scope).await?;
    Ok((StatusCode::OK, Json(report)).into_response())
}
