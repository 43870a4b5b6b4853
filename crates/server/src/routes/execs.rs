// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec registry endpoints: registrations, links, statuses, and the
//! derived tree.

use crate::auth;
use crate::error::ApiError;
use crate::state::SharedCtx;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use wb_store::StatusPatch;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub exec_id: String,
    pub session_id: String,
    #[serde(default)]
    pub created_at: Option<u64>,
}

pub async fn register(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let record = ctx
        .execs
        .register(&scope, &body.exec_id, &body.session_id, body.created_at)
        .await?;
    Ok(Json(serde_json::to_value(record).map_err(|e| ApiError::Fatal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkBody {
    pub calling_exec_id: String,
    pub triggered_exec_id: String,
    pub session_id: String,
    #[serde(default)]
    pub created_at: Option<u64>,
}

pub async fn link_register(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<LinkBody>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let link = ctx
        .execs
        .link_register(
            &scope,
            &body.calling_exec_id,
            &body.triggered_exec_id,
            &body.session_id,
            body.created_at,
        )
        .await?;
    Ok(Json(serde_json::to_value(link).map_err(|e| ApiError::Fatal(e.to_string()))?))
}

pub async fn links_by_calling(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let links = ctx.execs.links_by_calling(&scope, &id).await?;
    Ok(Json(serde_json::to_value(links).map_err(|e| ApiError::Fatal(e.to_string()))?))
}

pub async fn link_by_triggered(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let link = ctx
        .execs
        .link_by_triggered(&scope, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no link triggered {}", id)))?;
    Ok(Json(serde_json::to_value(link).map_err(|e| ApiError::Fatal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    pub exec_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub ended: Option<bool>,
    #[serde(default)]
    pub updated: Option<u64>,
    #[serde(default)]
    pub workflow: Option<Value>,
}

pub async fn status_update(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<StatusUpdateBody>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let patch = StatusPatch {
        status: body.status,
        result: body.result,
        error: body.error,
        ended: body.ended,
        updated: body.updated,
        workflow: body.workflow,
    };
    let stored = ctx.execs.status_update(&scope, &body.exec_id, patch).await?;
    Ok(Json(serde_json::to_value(stored).map_err(|e| ApiError::Fatal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusesBody {
    pub session_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn latest_statuses(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<StatusesBody>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let entries = ctx.execs.latest_statuses(&scope, &body.session_id, body.limit).await?;
    Ok(Json(serde_json::to_value(entries).map_err(|e| ApiError::Fatal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeBody {
    pub session_id: String,
    #[serde(default)]
    pub latest_only: bool,
}

pub async fn tree(
    State(ctx): State<SharedCtx>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<TreeBody>,
) -> Result<Json<Value>, ApiError> {
    let scope = auth::scope_from(&headers, &query)?;
    let forest = ctx.execs.tree(&scope, &body.session_id, body.latest_only).await?;
    Ok(Json(serde_json::to_value(forest).map_err(|e| ApiError::Fatal(e.to_string()))?))
}
