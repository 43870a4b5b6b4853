// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wb-core: shared types for the Workbridge execution bridge.
//!
//! Everything persisted to the metadata store or carried on the event wire
//! lives here, along with the ID and clock abstractions the other crates
//! build on.

pub mod clock;
pub mod event;
pub mod id;
pub mod record;
pub mod scope;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{EventCursor, ResultErr, ToolCall, ToolEvent, ToolFunction, ToolName, ToolResult};
pub use id::short;
pub use record::{
    ConsumerLock, ConsumerType, ExecLinkRecord, ExecRecord, ExecStatusRecord, RunnerMode,
    RuntimeInfo, WorkspaceRecord,
};
pub use scope::{Scope, ScopeError};

crate::define_id! {
    /// Identifier for one producer/consumer pair started for a project.
    ///
    /// The raw id doubles as the lock owner token and as the stem for
    /// container names, so it carries a long mode-independent prefix.
    pub struct ConsumerId("producer-");
}

crate::define_id! {
    /// Identifier for a managed workspace directory on the shared mount.
    pub struct WorkspaceId("wks-");
}
