// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide shutdown coordination.
//!
//! One cancellation token fans out to every long-lived task: streams stop
//! reading, sync loops finish their pass, monitors unwind. Registered
//! hooks (final snapshot, upstream stop notice, lock release) run
//! concurrently, each bounded to half the shutdown budget so a stuck hook
//! cannot eat the whole window.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type Hook = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    hooks: Arc<Mutex<Vec<(String, Hook)>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child token for a long-lived task.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a teardown hook. Hooks run concurrently at shutdown.
    pub fn register<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.hooks
            .lock()
            .push((name.into(), Box::new(move || Box::pin(hook()))));
    }

    /// Cancel everything and run the hooks within `budget`.
    pub async fn run(&self, budget: Duration) {
        info!("shutting down");
        self.token.cancel();

        let hooks: Vec<(String, BoxFuture<'static, ()>)> = {
            let registered = self.hooks.lock();
            registered.iter().map(|(name, hook)| (name.clone(), hook())).collect()
        };

        let step_budget = budget / 2;
        let all = hooks.into_iter().map(|(name, fut)| async move {
            if tokio::time::timeout(step_budget, fut).await.is_err() {
                warn!(hook = %name, "shutdown hook exceeded its budget");
            }
        });
        let _ = tokio::time::timeout(budget, futures_util::future::join_all(all)).await;
        info!("shutdown complete");
    }
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
