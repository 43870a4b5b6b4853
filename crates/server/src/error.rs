// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error taxonomy.
//!
//! Tool errors never appear here — they ride inside result frames and the
//! protocol keeps advancing. Everything in this enum is a request-level
//! failure with a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing required configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Retryable backend failure that exhausted its retries.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Fatal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<wb_store::StoreError> for ApiError {
    fn from(e: wb_store::StoreError) -> Self {
        use wb_store::StoreError;
        match e {
            StoreError::AlreadyExists(k) => ApiError::Conflict(k),
            StoreError::NotFound(k) => ApiError::NotFound(k),
            StoreError::Transient(m) => ApiError::Transient(m),
            StoreError::Serde(e) => ApiError::Fatal(e.to_string()),
        }
    }
}

impl From<wb_store::RegistryError> for ApiError {
    fn from(e: wb_store::RegistryError) -> Self {
        use wb_store::RegistryError;
        match e {
            RegistryError::Store(inner) => inner.into(),
            RegistryError::EmptyUpdate => {
                ApiError::BadRequest("status update carries no fields".into())
            }
        }
    }
}

impl From<wb_core::ScopeError> for ApiError {
    fn from(e: wb_core::ScopeError) -> Self {
        ApiError::Auth(e.to_string())
    }
}

impl From<wb_runner::RunnerError> for ApiError {
    fn from(e: wb_runner::RunnerError) -> Self {
        use wb_runner::RunnerError;
        match e {
            RunnerError::NotFound(n) => ApiError::NotFound(n),
            RunnerError::Backend(m) => ApiError::Transient(m),
            RunnerError::LaunchFailed(m) => ApiError::Fatal(m),
        }
    }
}

impl From<wb_sync::ObjectError> for ApiError {
    fn from(e: wb_sync::ObjectError) -> Self {
        use wb_sync::ObjectError;
        match e {
            ObjectError::NotFound(n) => ApiError::NotFound(n),
            ObjectError::PermissionDenied(m) => ApiError::Auth(m),
            ObjectError::PreconditionFailed(m) => ApiError::Conflict(m),
            ObjectError::Transient(m) => ApiError::Transient(m),
        }
    }
}
