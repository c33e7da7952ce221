//! Lazily opened, process-lifetime queue backend connection

use super::backend::{MemoryBackend, QueueBackend};
use super::redis_backend::{RedisBackend, RetryPolicy};
use super::Result;
use crate::config::{QueueBackendKind, QueueConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Opens the backend connection on first use
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn QueueBackend>>;
}

pub struct RedisConnector {
    url: String,
    retry: RetryPolicy,
}

impl RedisConnector {
    pub fn new(url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            retry,
        }
    }
}

#[async_trait]
impl QueueConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn QueueBackend>> {
        let backend = RedisBackend::connect(&self.url, self.retry).await?;
        Ok(Arc::new(backend))
    }
}

/// Connector handing out one in-process backend
#[derive(Default)]
pub struct MemoryConnector {
    backend: Arc<MemoryBackend>,
}

impl MemoryConnector {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl QueueConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn QueueBackend>> {
        Ok(self.backend.clone())
    }
}

/// Memoised backend shared by every queue handle and worker of a process.
///
/// The first [`get`](Self::get) connects; concurrent first callers wait for
/// that single attempt. A failed attempt is not memoised.
pub struct QueueConnectionRegistry {
    connector: Box<dyn QueueConnector>,
    backend: OnceCell<Arc<dyn QueueBackend>>,
}

impl QueueConnectionRegistry {
    pub fn new(connector: Box<dyn QueueConnector>) -> Self {
        Self {
            connector,
            backend: OnceCell::new(),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        match config.backend {
            QueueBackendKind::Redis => Self::new(Box::new(RedisConnector::new(
                config.redis_url.clone(),
                RetryPolicy::default(),
            ))),
            QueueBackendKind::Memory => Self::new(Box::new(MemoryConnector::default())),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn QueueBackend>> {
        let backend = self
            .backend
            .get_or_try_init(|| async {
                let backend = self.connector.connect().await?;
                tracing::debug!(backend = backend.kind(), "Queue backend connected");
                Ok::<_, super::QueueError>(backend)
            })
            .await?;
        Ok(backend.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.backend.initialized()
    }
}
