// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wb-server: the Workbridge HTTP service.
//!
//! Hosts the producer lifecycle endpoints, the two event-stream surfaces
//! (pull+callback and NDJSON push), and the exec registry. The `wbd`
//! binary also runs the pull loop headless (`wbd produce`) inside
//! launched producer workloads.

pub mod auth;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod producer;
pub mod routes;
pub mod shutdown;
pub mod sse;
pub mod state;
pub mod upstream;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppCtx, Config, SharedCtx};

#[cfg(test)]
pub(crate) mod test_ctx;
