//! Bounded exponential backoff around transient store failures.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use feast_types::EntityKey;

use crate::{OnlineRecord, OnlineStore, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Delay before retry number `attempt` (zero-based).
pub fn compute_backoff_delay(policy: &RetryPolicy, attempt: usize) -> Duration {
    let raw = policy.base_delay.as_secs_f64() * policy.backoff_multiplier.powi(attempt as i32);
    let capped = raw.min(policy.max_delay.as_secs_f64()).max(0.0);
    let secs = if policy.jitter {
        capped * jitter_factor(attempt)
    } else {
        capped
    };
    Duration::from_nanos((secs * 1e9).round() as u64)
}

/// Run `operation` until it succeeds, fails permanently, or the policy is
/// exhausted. The last error is returned on exhaustion.
pub async fn retry_async<T, Op, Fut>(policy: &RetryPolicy, mut operation: Op) -> StoreResult<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0usize;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_transient() || attempt >= policy.max_retries {
                    return Err(error);
                }
                let delay = compute_backoff_delay(policy, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying online store read: {error}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// Deterministic +/-50% jitter derived from the attempt number.
fn jitter_factor(attempt: usize) -> f64 {
    let mut x = (attempt as u64).wrapping_add(0x9e3779b97f4a7c15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    let normalized = (x % 10_000) as f64 / 10_000.0;
    0.5 + normalized
}

/// Store decorator that retries transient read failures per [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: OnlineStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: OnlineStore> OnlineStore for RetryingStore<S> {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn online_read(
        &self,
        project: &str,
        table: &str,
        keys: &[EntityKey],
        features: &[String],
    ) -> StoreResult<Vec<Option<OnlineRecord>>> {
        retry_async(&self.policy, || {
            self.inner.online_read(project, table, keys, features)
        })
        .await
    }
}
