//! Call-site retry and timeout handling for provider calls.
//!
//! Transient provider errors (see [`Error::is_transient`]) are retried with
//! exponential backoff up to the policy's attempt count. Timeouts are turned
//! into the provider's "unavailable" error so they retry the same way.

use crate::error::{Error, Result};
use crate::llm::{LlmRouter, Provider};
use crate::search::SearchClient;
use crate::state::SearchResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a provider call is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub backoff: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    operation,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bound `fut` by `limit`, mapping expiry through `on_timeout`.
pub async fn with_timeout<T, Fut>(
    limit: Duration,
    fut: Fut,
    on_timeout: impl FnOnce(String) -> Error,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("timed out after {:?}", limit))),
    }
}

/// One LLM completion with timeout and retry.
pub async fn complete(
    router: &LlmRouter,
    policy: &RetryPolicy,
    operation: &str,
    prompt: &str,
    provider: Provider,
    model: &str,
) -> Result<String> {
    with_retry(policy, operation, || {
        with_timeout(
            policy.timeout,
            router.complete(prompt, provider, model),
            Error::LlmUnavailable,
        )
    })
    .await
}

/// One search with timeout and retry.
pub async fn search(
    client: &dyn SearchClient,
    policy: &RetryPolicy,
    query: &str,
    max_results: usize,
    max_content_length: usize,
) -> Result<Vec<SearchResult>> {
    with_retry(policy, "search", || {
        with_timeout(
            policy.timeout,
            client.search(query, max_results, max_content_length),
            Error::SearchUnavailable,
        )
    })
    .await
}
