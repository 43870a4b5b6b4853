// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::memory::MemoryDocStore;
use std::time::Duration;
use wb_core::FakeClock;

fn setup() -> (Workspaces<FakeClock>, FakeClock, Scope) {
    let clock = FakeClock::new();
    let store = Arc::new(MemoryDocStore::new());
    let workspaces = Workspaces::with_clock(store, clock.clone());
    let scope = Scope::new("u1", "p1").unwrap();
    (workspaces, clock, scope)
}

#[tokio::test]
async fn resolve_creates_then_reuses_live_workspace() {
    let (workspaces, clock, scope) = setup();
    let first = workspaces.resolve_or_create(&scope, Some("s1"), DEFAULT_TTL_MS).await.unwrap();

    clock.advance(Duration::from_secs(60));
    let second = workspaces.resolve_or_create(&scope, Some("s1"), DEFAULT_TTL_MS).await.unwrap();
    assert_eq!(second.workspace_id, first.workspace_id);
    // Reuse refreshed the liveness window.
    assert_eq!(second.live_at, clock.epoch_ms());
}

#[tokio::test]
async fn resolve_creates_fresh_after_ttl() {
    let (workspaces, clock, scope) = setup();
    let first = workspaces.resolve_or_create(&scope, Some("s1"), 1_000).await.unwrap();
    clock.advance(Duration::from_millis(1_001));
    let second = workspaces.resolve_or_create(&scope, Some("s1"), 1_000).await.unwrap();
    assert_ne!(second.workspace_id, first.workspace_id);
}

#[tokio::test]
async fn sessions_do_not_share_workspaces() {
    let (workspaces, _, scope) = setup();
    let a = workspaces.resolve_or_create(&scope, Some("s1"), DEFAULT_TTL_MS).await.unwrap();
    let b = workspaces.resolve_or_create(&scope, Some("s2"), DEFAULT_TTL_MS).await.unwrap();
    let c = workspaces.resolve_or_create(&scope, None, DEFAULT_TTL_MS).await.unwrap();
    assert_ne!(a.workspace_id, b.workspace_id);
    assert_ne!(a.workspace_id, c.workspace_id);
}

#[tokio::test]
async fn heartbeat_never_moves_live_at_backwards() {
    let (workspaces, clock, scope) = setup();
    let ws = workspaces.resolve_or_create(&scope, None, DEFAULT_TTL_MS).await.unwrap();

    clock.advance(Duration::from_secs(10));
    let bumped = workspaces.heartbeat(&scope, &ws.workspace_id).await.unwrap().unwrap();
    assert_eq!(bumped.live_at, clock.epoch_ms());

    // A heartbeat with a clock behind live_at keeps the stored value.
    clock.set_epoch_ms(bumped.live_at - 5_000);
    let kept = workspaces.heartbeat(&scope, &ws.workspace_id).await.unwrap().unwrap();
    assert_eq!(kept.live_at, bumped.live_at);
}

#[tokio::test]
async fn heartbeat_unknown_workspace_is_none() {
    let (workspaces, _, scope) = setup();
    let missing = WorkspaceId::new();
    assert!(workspaces.heartbeat(&scope, &missing).await.unwrap().is_none());
}

#[tokio::test]
async fn get_returns_the_stored_record() {
    let (workspaces, _, scope) = setup();
    let created = workspaces.resolve_or_create(&scope, Some("s1"), DEFAULT_TTL_MS).await.unwrap();

    let fetched = workspaces.get(&scope, &created.workspace_id).await.unwrap().unwrap();
    assert_eq!(fetched, created);
    assert!(workspaces.get(&scope, &WorkspaceId::new()).await.unwrap().is_none());
}
