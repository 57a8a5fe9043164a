pub mod breaker;
pub mod cache;
pub mod providers;
pub mod queue;
pub mod rate_limit;
pub mod retry;
