//! Typed producer handles and worker startup over the shared connection

use super::backend::QueueBackend;
use super::job::{JobHandle, JobRecord, JOB_NAME};
use super::registry::QueueConnectionRegistry;
use super::schema::{JobSchema, QueueName};
use super::worker::{self, Job, Worker};
use super::{QueueError, Result};
use crate::logging::StructuredLogger;
use crate::telemetry::instrumentation::{inject_job_context, producer_span};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span};

/// Producer side of one queue
#[derive(Clone)]
pub struct QueueHandle {
    queue: QueueName,
    backend: Arc<dyn QueueBackend>,
    logger: StructuredLogger,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("queue", &self.queue)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl QueueHandle {
    pub fn queue(&self) -> QueueName {
        self.queue
    }

    /// Enqueue a typed payload; `J` must belong to this queue.
    pub async fn enqueue<J: JobSchema>(&self, job: &J) -> Result<JobHandle> {
        if J::QUEUE != self.queue {
            return Err(QueueError::Schema {
                queue: self.queue,
                reason: format!("payload belongs to queue '{}'", J::QUEUE),
            });
        }
        self.enqueue_value(serde_json::to_value(job)?).await
    }

    /// Validate `payload` against this queue's schema, then push it.
    pub async fn enqueue_value(&self, payload: Value) -> Result<JobHandle> {
        self.queue.schema().validate_value(&payload)?;
        self.push(payload).await
    }

    async fn push(&self, payload: Value) -> Result<JobHandle> {
        let queue = self.queue;
        async move {
            let id = self.backend.next_id(queue).await?.to_string();
            let span = Span::current();
            span.record("messaging.message.id", id.as_str());

            let record = JobRecord {
                id,
                queue,
                name: JOB_NAME.to_string(),
                payload,
                metadata: inject_job_context(&span),
                enqueued_at: Utc::now(),
            };
            self.backend.push(queue, record.encode()?).await?;

            self.logger.info(
                "Finished enqueueing job",
                json!({
                    "job": {
                        "id": record.id,
                        "queue": queue,
                        "name": record.name,
                        "metadata": record.metadata,
                    }
                }),
            );
            Ok(record.handle())
        }
        .instrument(producer_span(queue.as_str()))
        .await
    }
}

/// Builds queue handles and workers sharing one registry.
///
/// Schema checks run before the registry is touched, so rejected payloads
/// never cause a connection attempt.
#[derive(Clone)]
pub struct QueueHandleFactory {
    registry: Arc<QueueConnectionRegistry>,
    logger: StructuredLogger,
    poll_interval: Duration,
}

impl QueueHandleFactory {
    pub fn new(
        registry: Arc<QueueConnectionRegistry>,
        logger: StructuredLogger,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            logger,
            poll_interval,
        }
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Same registry, logging through `logger` (e.g. a request-scoped one)
    pub fn with_logger(&self, logger: StructuredLogger) -> Self {
        Self {
            registry: self.registry.clone(),
            logger,
            poll_interval: self.poll_interval,
        }
    }

    pub fn registry(&self) -> &Arc<QueueConnectionRegistry> {
        &self.registry
    }

    pub async fn handle(&self, queue: QueueName) -> Result<QueueHandle> {
        Ok(QueueHandle {
            queue,
            backend: self.registry.get().await?,
            logger: self.logger.clone(),
        })
    }

    /// One handle per requested queue, all over the shared connection
    pub async fn handles_for(&self, names: &[QueueName]) -> Result<HashMap<QueueName, QueueHandle>> {
        let backend = self.registry.get().await?;
        Ok(names
            .iter()
            .map(|&queue| {
                (
                    queue,
                    QueueHandle {
                        queue,
                        backend: backend.clone(),
                        logger: self.logger.clone(),
                    },
                )
            })
            .collect())
    }

    /// Enqueue a typed payload on the queue bound to `J`
    pub async fn enqueue<J: JobSchema>(&self, job: &J) -> Result<JobHandle> {
        let payload = serde_json::to_value(job)?;
        J::QUEUE.schema().validate_value(&payload)?;
        self.handle(J::QUEUE).await?.push(payload).await
    }

    /// Enqueue an untyped payload on the queue called `queue`
    pub async fn enqueue_value(&self, queue: &str, payload: Value) -> Result<JobHandle> {
        let queue: QueueName = queue.parse()?;
        queue.schema().validate_value(&payload)?;
        self.handle(queue).await?.push(payload).await
    }

    /// Start polling the queue bound to `J`, running `handler` for each job.
    ///
    /// Returns immediately; the connection is opened by the worker task.
    pub fn start_worker<J, H, Fut>(&self, handler: H) -> Worker
    where
        J: JobSchema,
        H: Fn(Job<J>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        worker::spawn(
            self.registry.clone(),
            self.logger.clone(),
            self.poll_interval,
            handler,
        )
    }
}
