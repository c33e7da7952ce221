//! Queue consumers

use super::job::JobRecord;
use super::registry::QueueConnectionRegistry;
use super::schema::{decode_payload, JobSchema, QueueName};
use crate::logging::StructuredLogger;
use crate::telemetry::instrumentation::consumer_span;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// A dequeued job with its decoded payload
#[derive(Debug, Clone)]
pub struct Job<J> {
    pub id: String,
    pub queue: QueueName,
    pub name: String,
    pub data: J,
    pub enqueued_at: DateTime<Utc>,
}

/// Running consumer of one queue.
///
/// Dropping the handle stops the worker the next time its queue is empty.
pub struct Worker {
    queue: QueueName,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("queue", &self.queue).finish_non_exhaustive()
    }
}

impl Worker {
    pub fn queue(&self) -> QueueName {
        self.queue
    }

    /// Stop polling and wait for the job in progress to finish
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(queue = %self.queue, "Worker task ended abnormally: {}", e);
        }
    }
}

pub(super) fn spawn<J, H, Fut>(
    registry: Arc<QueueConnectionRegistry>,
    logger: StructuredLogger,
    poll_interval: Duration,
    handler: H,
) -> Worker
where
    J: JobSchema,
    H: Fn(Job<J>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let queue = J::QUEUE;
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(queue, registry, logger, poll_interval, handler, stop_rx));
    Worker { queue, stop, task }
}

async fn run<J, H, Fut>(
    queue: QueueName,
    registry: Arc<QueueConnectionRegistry>,
    logger: StructuredLogger,
    poll_interval: Duration,
    handler: H,
    mut stop: watch::Receiver<bool>,
) where
    J: JobSchema,
    H: Fn(Job<J>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let backend = tokio::select! {
        backend = registry.get() => backend,
        _ = stop_requested(&mut stop) => return,
    };
    let backend = match backend {
        Ok(backend) => backend,
        Err(e) => {
            logger.error("Queue backend unavailable, worker not started", &e, json!({ "queue": queue }));
            return;
        }
    };
    logger.debug("Worker started", json!({ "queue": queue, "backend": backend.kind() }));

    while !*stop.borrow() {
        match backend.pop(queue).await {
            Ok(Some(raw)) => process(queue, &raw, &handler, &logger).await,
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = stop_requested(&mut stop) => break,
                }
            }
            Err(e) => {
                logger.error("Failed to poll queue", &e, json!({ "queue": queue }));
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    logger.debug("Worker stopped", json!({ "queue": queue }));
}

/// Resolves once a stop is requested or the `Worker` handle is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn process<J, H, Fut>(queue: QueueName, raw: &str, handler: &H, logger: &StructuredLogger)
where
    J: JobSchema,
    H: Fn(Job<J>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let record = match JobRecord::decode(raw) {
        Ok(record) => record,
        Err(e) => {
            logger.warn(
                "Dropping malformed job record",
                json!({ "queue": queue, "reason": e.to_string() }),
            );
            return;
        }
    };

    let span = consumer_span(queue.as_str(), &record.id, &record.metadata);
    let job_fields = json!({ "job": { "id": record.id, "queue": queue, "name": record.name } });

    let data = match decode_payload::<J>(&record.payload) {
        Ok(data) => data,
        Err(e) => {
            span.in_scope(|| {
                logger.warn(
                    "Dropping job with invalid payload",
                    json!({ "job": { "id": record.id, "queue": queue }, "reason": e.to_string() }),
                )
            });
            return;
        }
    };

    let job = Job {
        id: record.id.clone(),
        queue,
        name: record.name.clone(),
        data,
        enqueued_at: record.enqueued_at,
    };

    // The handler runs in its own task so a panic stays inside it.
    let outcome = tokio::spawn(handler(job).instrument(span.clone())).await;

    span.in_scope(|| match outcome {
        Ok(Ok(())) => logger.debug("Job completed", job_fields),
        Ok(Err(e)) => logger.error("Job failed", &*e, job_fields),
        Err(e) => logger.error("Job handler panicked", &e, job_fields),
    });
}
