// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant scope for all metadata and sandbox operations.
//!
//! Every metadata document and every work root is owned by a
//! `(user, project)` pair. The scope is validated once at the boundary and
//! threaded through as a value type; document keys derive from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A validated `(user_id, project_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    user_id: String,
    project_id: String,
}

/// Scope validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("missing userId")]
    MissingUser,

    #[error("missing projectId")]
    MissingProject,

    #[error("invalid id segment: {0:?}")]
    InvalidSegment(String),
}

impl Scope {
    /// Validate and build a scope.
    ///
    /// Ids become path segments of document keys and of the work-root
    /// template, so separators and traversal components are rejected here.
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Result<Self, ScopeError> {
        let user_id = user_id.into();
        let project_id = project_id.into();
        if user_id.is_empty() {
            return Err(ScopeError::MissingUser);
        }
        if project_id.is_empty() {
            return Err(ScopeError::MissingProject);
        }
        for seg in [&user_id, &project_id] {
            if seg.contains('/') || seg.contains('\\') || seg == "." || seg == ".." {
                return Err(ScopeError::InvalidSegment(seg.clone()));
            }
        }
        Ok(Self { user_id, project_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Key prefix shared by every document in this scope.
    ///
    /// This is also the exact key of singleton documents (the consumer
    /// lock). For prefix *queries* use [`Scope::query_prefix`]: without
    /// the trailing separator, project `"p"` would match keys of any
    /// sibling project whose id merely extends it (`"p2"`, `"p1x"`).
    pub fn key_prefix(&self) -> String {
        format!("{}/{}", self.user_id, self.project_id)
    }

    /// Separator-terminated prefix matching exactly this scope's
    /// documents and nothing from textually-adjacent projects.
    pub fn query_prefix(&self) -> String {
        format!("{}/{}/", self.user_id, self.project_id)
    }

    /// Full document key for an entity id within this scope.
    pub fn doc_key(&self, id: &str) -> String {
        format!("{}/{}/{}", self.user_id, self.project_id, id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.project_id)
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
