use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::models::message::JobEnvelope;

const READY_KEY: &str = "content_jobs:ready";
const PROCESSING_KEY: &str = "content_jobs:processing";
const DELAYED_KEY: &str = "content_jobs:delayed";
const LEASE_KEY: &str = "content_jobs:leases";
const UNIQUE_PREFIX: &str = "content_jobs:unique:";

/// In-flight uniqueness markers expire after this many seconds in case a
/// worker dies without completing the message.
const UNIQUE_LOCK_TTL_SECS: i64 = 3600;

/// How long a dequeued envelope may sit in the processing list before the
/// reaper returns it to the ready list.
const DEFAULT_LEASE_TTL_SECS: i64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Producer-side queue interface used by jobs to requeue and reschedule.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Push an envelope, eligible for processing after `delay_seconds`
    /// (0 = immediately). Envelopes with a `unique_key` are dropped when an
    /// instance with the same key is already in flight.
    async fn push(&self, envelope: &JobEnvelope, delay_seconds: u64) -> Result<(), QueueError>;

    /// Push the successor of an in-flight envelope. Takes over the
    /// predecessor's uniqueness marker instead of re-acquiring it, so a
    /// retry or reschedule is never dropped by the lock its own
    /// predecessor still holds.
    async fn push_successor(
        &self,
        envelope: &JobEnvelope,
        delay_seconds: u64,
    ) -> Result<(), QueueError>;
}

/// Redis-backed job queue: a ready list, a processing list, and a sorted
/// set of delayed envelopes scored by their eligibility timestamp.
///
/// Uniqueness markers store the id of the envelope that owns them, so a
/// successor can take a marker over and the predecessor's completion will
/// not release it out from under the queued successor.
pub struct RedisJobQueue {
    client: redis::Client,
    lease_ttl_secs: i64,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
        })
    }

    /// Override the processing lease, mainly for tests.
    pub fn with_lease_ttl(mut self, secs: i64) -> Self {
        self.lease_ttl_secs = secs;
        self
    }

    /// Dequeue the next ready envelope, moving it to the processing list
    /// under a lease.
    pub async fn dequeue(&self) -> Result<Option<JobEnvelope>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.rpoplpush(READY_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => {
                let deadline = Utc::now().timestamp() + self.lease_ttl_secs;
                conn.zadd::<_, _, _, ()>(LEASE_KEY, &payload, deadline).await?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    /// Move delayed envelopes whose eligibility time has passed onto the
    /// ready list. Returns how many were promoted.
    pub async fn promote_due(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now = Utc::now().timestamp();
        let due: Vec<String> = conn
            .zrangebyscore(DELAYED_KEY, "-inf", now)
            .await?;

        let mut promoted = 0;
        for payload in due {
            let removed: u64 = conn.zrem(DELAYED_KEY, &payload).await?;
            // Another worker may have promoted it between the range read
            // and the remove; only push when we won the removal.
            if removed > 0 {
                conn.lpush::<_, _, ()>(READY_KEY, &payload).await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Return processing-list envelopes whose lease has expired to the
    /// ready list. Covers workers that died mid-job. Returns how many
    /// envelopes were reaped.
    pub async fn reap_expired(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now = Utc::now().timestamp();
        let expired: Vec<String> = conn.zrangebyscore(LEASE_KEY, "-inf", now).await?;

        let mut reaped = 0;
        for payload in expired {
            let removed: u64 = conn.zrem(LEASE_KEY, &payload).await?;
            if removed > 0 {
                conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
                conn.lpush::<_, _, ()>(READY_KEY, &payload).await?;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Mark an envelope complete: drop it from the processing list and its
    /// lease, and release the uniqueness marker if this envelope still
    /// owns it. A marker taken over by a successor stays in place.
    pub async fn complete(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(envelope)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        conn.zrem::<_, _, ()>(LEASE_KEY, &payload).await?;
        if let Some(key) = &envelope.unique_key {
            let lock_key = format!("{UNIQUE_PREFIX}{key}");
            let owner: Option<String> = conn.get(&lock_key).await?;
            if owner.as_deref() == Some(envelope.id.to_string().as_str()) {
                conn.del::<_, ()>(&lock_key).await?;
            }
        }
        Ok(())
    }

    /// Number of ready (not delayed, not in-flight) jobs.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.llen(READY_KEY).await?)
    }

    /// Check Redis connectivity (for health reporting).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn enqueue(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        envelope: &JobEnvelope,
        delay_seconds: u64,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(envelope)?;
        if delay_seconds == 0 {
            conn.lpush::<_, _, ()>(READY_KEY, &payload).await?;
        } else {
            let eligible_at = Utc::now().timestamp() + delay_seconds as i64;
            conn.zadd::<_, _, _, ()>(DELAYED_KEY, &payload, eligible_at).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Queue for RedisJobQueue {
    async fn push(&self, envelope: &JobEnvelope, delay_seconds: u64) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        if let Some(key) = &envelope.unique_key {
            let lock_key = format!("{UNIQUE_PREFIX}{key}");
            let acquired: bool = conn.set_nx(&lock_key, envelope.id.to_string()).await?;
            if !acquired {
                tracing::debug!(unique_key = %key, "Job already in flight, skipping enqueue");
                return Ok(());
            }
            conn.expire::<_, ()>(&lock_key, UNIQUE_LOCK_TTL_SECS).await?;
        }

        self.enqueue(&mut conn, envelope, delay_seconds).await
    }

    async fn push_successor(
        &self,
        envelope: &JobEnvelope,
        delay_seconds: u64,
    ) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Overwrite the marker with the successor's id and a fresh TTL.
        // The predecessor's completion then leaves it alone.
        if let Some(key) = &envelope.unique_key {
            let lock_key = format!("{UNIQUE_PREFIX}{key}");
            conn.set_ex::<_, _, ()>(
                &lock_key,
                envelope.id.to_string(),
                UNIQUE_LOCK_TTL_SECS as u64,
            )
            .await?;
        }

        self.enqueue(&mut conn, envelope, delay_seconds).await
    }
}

/// Recording queue for unit tests. Successor pushes are recorded
/// separately so tests can tell a retry or reschedule from a fresh
/// enqueue.
#[derive(Default)]
pub struct MemoryQueue {
    pushed: Mutex<Vec<(JobEnvelope, u64)>>,
    requeued: Mutex<Vec<(JobEnvelope, u64)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pushed(&self) -> Vec<(JobEnvelope, u64)> {
        self.pushed.lock().await.clone()
    }

    pub async fn requeued(&self) -> Vec<(JobEnvelope, u64)> {
        self.requeued.lock().await.clone()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, envelope: &JobEnvelope, delay_seconds: u64) -> Result<(), QueueError> {
        self.pushed.lock().await.push((envelope.clone(), delay_seconds));
        Ok(())
    }

    async fn push_successor(
        &self,
        envelope: &JobEnvelope,
        delay_seconds: u64,
    ) -> Result<(), QueueError> {
        self.requeued
            .lock()
            .await
            .push((envelope.clone(), delay_seconds));
        Ok(())
    }
}
