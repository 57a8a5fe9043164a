use std::sync::Arc;
use std::time::Duration;

use crate::services::cache::{CacheError, SharedCache};

/// Failures before the breaker opens for a service.
pub const FAILURE_THRESHOLD: u64 = 5;

/// Failure-counter TTL. Restarted on every recorded failure, so recovery is
/// purely time-based: one quiet hour and the counter vanishes. There is no
/// half-open probe state.
pub const COOLDOWN: Duration = Duration::from_secs(3600);

/// Per-service failure-count gate in front of external AI providers.
///
/// State lives in the shared cache so the count is visible to all workers.
#[derive(Clone)]
pub struct CircuitBreaker {
    cache: Arc<dyn SharedCache>,
}

impl CircuitBreaker {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    fn key(service: &str) -> String {
        format!("circuit_breaker:{service}")
    }

    /// True once the failure counter has reached the threshold.
    pub async fn is_open(&self, service: &str) -> Result<bool, CacheError> {
        let failures = self.cache.read_u64(&Self::key(service)).await?.unwrap_or(0);
        Ok(failures >= FAILURE_THRESHOLD)
    }

    /// Record a provider failure, restarting the cooldown TTL.
    pub async fn record_failure(&self, service: &str) -> Result<u64, CacheError> {
        let failures = self.cache.increment(&Self::key(service), COOLDOWN).await?;
        if failures == FAILURE_THRESHOLD {
            tracing::warn!(service, failures, "Circuit breaker opened");
            metrics::counter!("circuit_breaker_open_total", "service" => service.to_string())
                .increment(1);
        }
        Ok(failures)
    }

    /// Any success resets the counter entirely (not decremented).
    pub async fn reset(&self, service: &str) -> Result<(), CacheError> {
        self.cache.delete(&Self::key(service)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryCache;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn opens_at_exactly_five_failures() {
        let breaker = breaker();
        for _ in 0..4 {
            breaker.record_failure("anthropic").await.unwrap();
            assert!(!breaker.is_open("anthropic").await.unwrap());
        }
        breaker.record_failure("anthropic").await.unwrap();
        assert!(breaker.is_open("anthropic").await.unwrap());
    }

    #[tokio::test]
    async fn single_success_fully_resets() {
        let breaker = breaker();
        for _ in 0..7 {
            breaker.record_failure("google").await.unwrap();
        }
        assert!(breaker.is_open("google").await.unwrap());

        breaker.reset("google").await.unwrap();
        assert!(!breaker.is_open("google").await.unwrap());

        // One fresh failure does not reopen.
        breaker.record_failure("google").await.unwrap();
        assert!(!breaker.is_open("google").await.unwrap());
    }

    #[tokio::test]
    async fn services_are_tracked_independently() {
        let breaker = breaker();
        for _ in 0..5 {
            breaker.record_failure("anthropic").await.unwrap();
        }
        assert!(breaker.is_open("anthropic").await.unwrap());
        assert!(!breaker.is_open("google").await.unwrap());
    }
}
