// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface.
//!
//! One file per concern: producer lifecycle, the two stream endpoints,
//! and the exec registry. Everything shares the [`SharedCtx`] state.

pub mod execs;
pub mod producer;
pub mod streams;

use crate::state::SharedCtx;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

pub fn router(ctx: SharedCtx) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/producer/start", post(producer::start))
        .route("/producer/stop", post(producer::stop))
        .route("/sessions/consume", get(streams::consume))
        .route("/sessions/stream", post(streams::stream))
        .route("/execs/register", post(execs::register))
        .route("/links/register", post(execs::link_register))
        .route("/links/by-calling/{id}", get(execs::links_by_calling))
        .route("/links/by-triggered/{id}", get(execs::link_by_triggered))
        .route("/status/update", post(execs::status_update))
        .route("/status", post(execs::latest_statuses))
        .route("/tree", post(execs::tree))
        .with_state(ctx)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}
