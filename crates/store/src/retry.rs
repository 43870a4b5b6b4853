// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry for transient store errors.

use crate::doc::StoreError;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Maximum attempts for a retryable store operation.
pub const MAX_TRIES: u32 = 3;

const BASE_DELAY_MS: u64 = 150;
const JITTER_CAP_MS: u64 = 50;

/// Run `op` until it succeeds, a non-transient error surfaces, or
/// [`MAX_TRIES`] attempts are spent. Backoff is `150ms × attempt` plus
/// jitter.
pub async fn with_retries<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < MAX_TRIES => {
                let delay = backoff_delay(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * u64::from(attempt) + jitter_ms())
}

// Subsecond clock noise is jitter enough; avoids pulling in an RNG.
fn jitter_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()) % JITTER_CAP_MS)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
