use crate::models::message::JobEnvelope;
use crate::models::outcome::JobOutcome;

/// Base delay for exponential backoff, in seconds.
pub const BASE_DELAY_SECS: u64 = 60;

/// Delay applied when rescheduling a job blocked by rate limiting.
pub const RATE_LIMIT_DELAY_SECS: u64 = 3600;

/// Error-message signatures treated as transient provider failures.
const TRANSIENT_PATTERNS: [&str; 8] = [
    "rate limit",
    "timeout",
    "connection",
    "temporary",
    "service unavailable",
    "502",
    "503",
    "504",
];

/// Decides whether and when a failed job runs again. The queue consumer
/// performs the actual enqueue of the successor envelope.
pub struct RetryScheduler;

impl RetryScheduler {
    /// `60 * 2^(attempt-1)` seconds: 60, 120, 240, ...
    pub fn backoff_delay(attempt: u32) -> u64 {
        BASE_DELAY_SECS * 2u64.pow(attempt.saturating_sub(1))
    }

    /// Retry outcome for a failed execution, or `None` when the error is
    /// not transient or the attempt budget is spent (permanent rejection).
    pub fn decide(envelope: &JobEnvelope, max_attempts: u32, error: &str) -> Option<JobOutcome> {
        if envelope.attempt >= max_attempts || !is_transient_error(error) {
            return None;
        }
        Some(JobOutcome::Requeued {
            delay_seconds: Self::backoff_delay(envelope.attempt),
            reason: error.to_string(),
        })
    }
}

/// Match an error message against the known transient signatures.
pub fn is_transient_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::{JobPayload, TagUpdatePayload};
    use uuid::Uuid;

    fn envelope() -> JobEnvelope {
        JobEnvelope::new(JobPayload::TagUpdate(TagUpdatePayload {
            id: Uuid::new_v4(),
            title: "t".to_string(),
        }))
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(RetryScheduler::backoff_delay(1), 60);
        assert_eq!(RetryScheduler::backoff_delay(2), 120);
        assert_eq!(RetryScheduler::backoff_delay(3), 240);
    }

    #[test]
    fn transient_signatures_match_case_insensitively() {
        assert!(is_transient_error("Rate Limit exceeded"));
        assert!(is_transient_error("upstream returned 503"));
        assert!(is_transient_error("Connection reset by peer"));
        assert!(is_transient_error("Service Unavailable"));
        assert!(!is_transient_error("invalid API key"));
        assert!(!is_transient_error("malformed request body"));
    }

    #[test]
    fn permanent_errors_are_never_retried() {
        let env = envelope();
        assert!(RetryScheduler::decide(&env, 3, "invalid API key").is_none());
    }

    #[test]
    fn retries_exactly_max_attempts_minus_one_times() {
        let max_attempts = 3;
        let mut env = envelope();
        let mut retries = 0;

        loop {
            match RetryScheduler::decide(&env, max_attempts, "request timeout") {
                Some(JobOutcome::Requeued { delay_seconds, reason }) => {
                    assert_eq!(delay_seconds, RetryScheduler::backoff_delay(env.attempt));
                    env = env.next_attempt(&reason);
                    retries += 1;
                }
                Some(_) => unreachable!(),
                None => break,
            }
        }

        assert_eq!(retries, max_attempts - 1);
        assert_eq!(env.previous_attempts.len() as u32, max_attempts - 1);
        assert_eq!(env.attempt, max_attempts);
    }
}
