// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-root derivation and strict path containment.
//!
//! The work root for a request is `WORK_ROOT` joined with a rendered
//! prefix template. Tool file paths are then resolved lexically against
//! that root; any resolution that would leave it is refused before the
//! filesystem is touched, so even a dangling `..` cannot probe the mount.

use crate::tool::ToolError;
use std::path::{Component, Path, PathBuf};

/// Values available to the prefix template.
#[derive(Debug, Clone, Default)]
pub struct PrefixVars<'a> {
    pub user_id: &'a str,
    pub project_id: &'a str,
    pub workspace_id: &'a str,
    pub session_id: &'a str,
}

impl<'a> PrefixVars<'a> {
    fn lookup(&self, token: &str) -> Option<&'a str> {
        match token {
            "userId" => Some(self.user_id),
            "projectId" => Some(self.project_id),
            "workspaceId" => Some(self.workspace_id),
            "sessionId" => Some(self.session_id),
            _ => None,
        }
    }
}

/// Render a `{token}`-style prefix template.
///
/// Recognized tokens are `{userId}`, `{projectId}`, `{workspaceId}` and
/// `{sessionId}`; unknown tokens render empty. Empty path segments left
/// behind by empty substitutions are dropped.
pub fn render_prefix(template: &str, vars: &PrefixVars<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                let token = &rest[open + 1..open + close];
                out.push_str(vars.lookup(token).unwrap_or(""));
                rest = &rest[open + close + 1..];
            }
            None => {
                // Unbalanced brace: keep the tail verbatim.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out.split('/').filter(|seg| !seg.is_empty()).collect::<Vec<_>>().join("/")
}

/// Resolve `filepath` strictly inside `root`.
///
/// Absolute paths, drive prefixes, and any `..` traversal that would pop
/// past the root are rejected with [`ToolError::PathEscape`]. Resolution
/// is lexical; the target does not need to exist.
pub fn resolve_within(root: &Path, filepath: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(filepath);
    if candidate.is_absolute() {
        return Err(ToolError::PathEscape);
    }

    let mut depth: usize = 0;
    let mut resolved = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(seg) => {
                resolved.push(seg);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(ToolError::PathEscape);
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return Err(ToolError::PathEscape),
        }
    }
    if depth == 0 {
        // Resolving to the root itself is not a usable file path.
        return Err(ToolError::PathEscape);
    }
    Ok(resolved)
}

#[cfg(test)]
#[path = "workroot_tests.rs"]
mod tests;
