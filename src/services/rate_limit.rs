use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::services::cache::{CacheError, SharedCache};

/// Keys are bucketed per hour/day; the TTL just garbage-collects stale
/// buckets after the window has rolled over.
const REQUEST_BUCKET_TTL: Duration = Duration::from_secs(2 * 3600);
const COST_BUCKET_TTL: Duration = Duration::from_secs(48 * 3600);

/// Decision from a limit check. `reasons` is non-empty iff not allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitDecision {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

/// Per-service request and spend budgets backed by the shared cache.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn SharedCache>,
    hourly_limit: u64,
    daily_cost_limit: f64,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn SharedCache>, hourly_limit: u64, daily_cost_limit: f64) -> Self {
        Self {
            cache,
            hourly_limit,
            daily_cost_limit,
        }
    }

    fn request_key(service: &str) -> String {
        format!("rate_limit:{service}:{}", Utc::now().format("%Y-%m-%d-%H"))
    }

    fn cost_key(service: &str) -> String {
        format!("ai_cost:{service}:{}", Utc::now().format("%Y-%m-%d"))
    }

    /// Check both budgets without consuming any of them.
    pub async fn check_limits(&self, service: &str) -> Result<LimitDecision, CacheError> {
        let mut reasons = Vec::new();

        if self.hourly_limit > 0 {
            let used = self
                .cache
                .read_u64(&Self::request_key(service))
                .await?
                .unwrap_or(0);
            if used >= self.hourly_limit {
                reasons.push(format!(
                    "hourly request limit reached for {service}: {used}/{}",
                    self.hourly_limit
                ));
            }
        }

        if self.daily_cost_limit > 0.0 {
            let spent = self
                .cache
                .read_f64(&Self::cost_key(service))
                .await?
                .unwrap_or(0.0);
            if spent >= self.daily_cost_limit {
                reasons.push(format!(
                    "daily cost limit reached for {service}: {spent:.2}/{:.2} USD",
                    self.daily_cost_limit
                ));
            }
        }

        Ok(LimitDecision {
            allowed: reasons.is_empty(),
            reasons,
        })
    }

    /// Consume one request from the hourly budget.
    pub async fn record_request(&self, service: &str) -> Result<u64, CacheError> {
        self.cache
            .increment(&Self::request_key(service), REQUEST_BUCKET_TTL)
            .await
    }

    /// Add a completed operation's cost to the daily spend.
    pub async fn record_cost(&self, service: &str, cost_usd: f64) -> Result<f64, CacheError> {
        self.cache
            .increment_f64(&Self::cost_key(service), cost_usd, COST_BUCKET_TTL)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryCache;

    fn limiter(hourly: u64, daily_cost: f64) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCache::new()), hourly, daily_cost)
    }

    #[tokio::test]
    async fn allows_until_hourly_budget_exhausted() {
        let limiter = limiter(3, 0.0);
        for _ in 0..3 {
            assert!(limiter.check_limits("anthropic").await.unwrap().allowed);
            limiter.record_request("anthropic").await.unwrap();
        }
        let decision = limiter.check_limits("anthropic").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reasons.len(), 1);
        assert!(decision.reasons[0].contains("hourly request limit"));
    }

    #[tokio::test]
    async fn cost_budget_blocks_independently() {
        let limiter = limiter(0, 10.0);
        limiter.record_cost("anthropic", 9.5).await.unwrap();
        assert!(limiter.check_limits("anthropic").await.unwrap().allowed);

        limiter.record_cost("anthropic", 1.0).await.unwrap();
        let decision = limiter.check_limits("anthropic").await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reasons[0].contains("daily cost limit"));
    }

    #[tokio::test]
    async fn zero_limits_mean_unlimited() {
        let limiter = limiter(0, 0.0);
        for _ in 0..50 {
            limiter.record_request("google").await.unwrap();
        }
        assert!(limiter.check_limits("google").await.unwrap().allowed);
    }
}
