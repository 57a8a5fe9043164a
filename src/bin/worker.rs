use content_reliability::{
    app_state::AppState,
    config::AppConfig,
    db, jobs,
    models::outcome::JobOutcome,
    services::{
        cache::RedisCache,
        queue::{Queue, RedisJobQueue},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting content reliability worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize Prometheus metrics exporter
    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .expect("Invalid metrics bind address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");

    // Register application metrics
    metrics::describe_counter!("jobs_processed_total", "Jobs that completed successfully");
    metrics::describe_counter!("jobs_rejected_total", "Jobs that failed permanently");
    metrics::describe_counter!("jobs_requeued_total", "Jobs re-enqueued for retry");
    metrics::describe_histogram!("job_duration_seconds", "Wall-clock time per job execution");
    metrics::describe_counter!("ai_operations_total", "AI provider operations completed");
    metrics::describe_counter!("ai_tokens_total", "Tokens consumed by AI operations");
    metrics::describe_counter!("ai_cost_usd_total", "AI spend in micro-USD");
    metrics::describe_counter!(
        "ai_circuit_open_skips_total",
        "AI calls skipped because the circuit breaker was open"
    );
    metrics::describe_counter!("ai_rate_limited_total", "AI calls blocked by budget limits");
    metrics::describe_counter!(
        "circuit_breaker_open_total",
        "Times a service circuit breaker opened"
    );
    metrics::describe_gauge!("queue_depth", "Jobs currently waiting in the ready queue");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis-backed services
    tracing::info!("Connecting to Redis");
    let cache =
        Arc::new(RedisCache::new(&config.redis_url).expect("Failed to initialize shared cache"));
    let queue =
        Arc::new(RedisJobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));
    queue
        .health_check()
        .await
        .expect("Redis is not reachable");

    let state = AppState::new(config, pool, cache, queue.clone());

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match process_next_job(&state, &queue).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(
    state: &AppState,
    queue: &RedisJobQueue,
) -> Result<bool, Box<dyn std::error::Error>> {
    // Move delayed jobs whose eligibility time has passed onto the ready list
    let promoted = queue.promote_due().await?;
    if promoted > 0 {
        tracing::debug!(promoted, "Promoted delayed jobs");
    }

    // Re-deliver envelopes abandoned by a worker that died mid-job.
    let reaped = queue.reap_expired().await?;
    if reaped > 0 {
        tracing::warn!(reaped, "Returned expired job leases to the ready queue");
    }

    let envelope = match queue.dequeue().await? {
        Some(e) => e,
        None => return Ok(false),
    };

    let outcome = jobs::dispatch(state, &envelope).await;

    match outcome {
        JobOutcome::Acknowledged | JobOutcome::Rejected => {
            queue.complete(&envelope).await?;
        }
        JobOutcome::Requeued {
            delay_seconds,
            reason,
        } => {
            // The successor carries the incremented attempt counter and
            // the failure history, and takes over the in-flight
            // uniqueness marker so the retry is not dropped by it.
            let successor = envelope.next_attempt(&reason);
            queue.push_successor(&successor, delay_seconds).await?;
            queue.complete(&envelope).await?;
        }
    }

    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("queue_depth").set(depth as f64);
    }

    Ok(true)
}
