//! Redis queue backend
//!
//! Layout per queue:
//! - `otel-harness:queue:<name>:wait` list of encoded records (LPUSH / RPOP)
//! - `otel-harness:queue:<name>:id` job id counter (INCR)

use super::backend::QueueBackend;
use super::schema::QueueName;
use super::{QueueError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, RedisResult};
use std::future::Future;
use std::time::Duration;

const KEY_PREFIX: &str = "otel-harness:queue";

fn wait_key(queue: QueueName) -> String {
    format!("{}:{}:wait", KEY_PREFIX, queue)
}

fn id_key(queue: QueueName) -> String {
    format!("{}:{}:id", KEY_PREFIX, queue)
}

/// Capped exponential backoff with no attempt limit
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Connection-level failures worth waiting out; anything else is returned
pub fn is_transient(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

/// Queue backend over a managed Redis connection
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    retry: RetryPolicy,
}

impl RedisBackend {
    /// Connect to `url`, retrying until the server is reachable.
    ///
    /// A malformed URL fails immediately.
    pub async fn connect(url: &str, retry: RetryPolicy) -> Result<Self> {
        let client = redis::Client::open(url)?;

        let mut attempt = 0u32;
        loop {
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => {
                    tracing::info!(attempts = attempt + 1, "Connected to Redis queue backend");
                    return Ok(Self { conn, retry });
                }
                Err(e) if is_transient(&e) => {
                    let delay = retry.delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Redis unavailable, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(QueueError::Backend(e)),
            }
        }
    }

    /// Run `op` until it succeeds or fails with a non-transient error
    async fn with_retry<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match f(self.conn.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        op,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Redis operation failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(QueueError::Backend(e)),
            }
        }
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn next_id(&self, queue: QueueName) -> Result<u64> {
        let key = id_key(queue);
        self.with_retry("INCR", |mut conn| {
            let key = key.clone();
            async move { redis::cmd("INCR").arg(&key).query_async(&mut conn).await }
        })
        .await
    }

    async fn push(&self, queue: QueueName, encoded: String) -> Result<()> {
        let key = wait_key(queue);
        self.with_retry("LPUSH", |mut conn| {
            let key = key.clone();
            let encoded = encoded.clone();
            async move {
                redis::cmd("LPUSH")
                    .arg(&key)
                    .arg(encoded)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn pop(&self, queue: QueueName) -> Result<Option<String>> {
        let key = wait_key(queue);
        self.with_retry("RPOP", |mut conn| {
            let key = key.clone();
            async move { redis::cmd("RPOP").arg(&key).query_async(&mut conn).await }
        })
        .await
    }
}
