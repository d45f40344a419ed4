// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Bounded retry with exponential backoff for transient provider errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::ModelError;

/// Base delay for the first retry.
const BASE_DELAY: Duration = Duration::from_millis(500);
/// Ceiling for any single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Delay before retry `attempt` (0-based), doubling from [`BASE_DELAY`] and
/// capped at [`MAX_DELAY`].  A provider-indicated wait takes precedence.
pub fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(d) = retry_after {
        return d.min(MAX_DELAY);
    }
    let exp = BASE_DELAY.saturating_mul(1u32 << attempt.min(16));
    exp.min(MAX_DELAY)
}

/// Run `f`, retrying up to `max_retries` times on transient errors.
///
/// Fatal errors surface immediately; the final transient error surfaces
/// after the budget is exhausted.  Action dispatch is never routed through
/// here — only LLM calls retry.
pub async fn with_retries<T, F, Fut>(max_retries: u32, mut f: F) -> Result<T, ModelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(attempt, e.retry_after());
                warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64,
                      "transient provider error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ModelError {
        ModelError::Transient { status: Some(500), message: "boom".into(), retry_after: None }
    }

    fn fatal() -> ModelError {
        ModelError::Fatal { status: Some(400), message: "bad request".into() }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_retries(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(fatal())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_then_surfaces_error() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_retries(2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial try + 2 retries");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(10, None), Duration::from_secs(30));
    }

    #[test]
    fn provider_indicated_wait_wins() {
        assert_eq!(
            backoff_delay(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }
}
