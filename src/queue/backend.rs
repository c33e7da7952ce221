//! Storage seam of the job queues

use super::schema::QueueName;
use super::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Shared connection to the store holding the queues.
///
/// Records cross this seam already encoded, so every backend stores the
/// same wire format.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Short backend name for logs
    fn kind(&self) -> &'static str;

    /// Next job id of `queue`, unique per backend
    async fn next_id(&self, queue: QueueName) -> Result<u64>;

    async fn push(&self, queue: QueueName, encoded: String) -> Result<()>;

    /// Oldest waiting record, or `None` when the queue is empty
    async fn pop(&self, queue: QueueName) -> Result<Option<String>>;
}

#[derive(Default)]
struct MemoryQueue {
    last_id: u64,
    waiting: VecDeque<String>,
}

/// In-process backend. Producer and worker must live in the same process.
#[derive(Default)]
pub struct MemoryBackend {
    queues: Mutex<HashMap<QueueName, MemoryQueue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records waiting in `queue`
    pub fn len(&self, queue: QueueName) -> usize {
        self.with_queue(queue, |q| q.waiting.len())
    }

    fn with_queue<T>(&self, queue: QueueName, f: impl FnOnce(&mut MemoryQueue) -> T) -> T {
        let mut queues = self
            .queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(queues.entry(queue).or_default())
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn next_id(&self, queue: QueueName) -> Result<u64> {
        Ok(self.with_queue(queue, |q| {
            q.last_id += 1;
            q.last_id
        }))
    }

    async fn push(&self, queue: QueueName, encoded: String) -> Result<()> {
        self.with_queue(queue, |q| q.waiting.push_back(encoded));
        Ok(())
    }

    async fn pop(&self, queue: QueueName) -> Result<Option<String>> {
        Ok(self.with_queue(queue, |q| q.waiting.pop_front()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_is_fifo() {
        let backend = MemoryBackend::new();
        backend.push(QueueName::Foo, "a".into()).await.unwrap();
        backend.push(QueueName::Foo, "b".into()).await.unwrap();
        assert_eq!(backend.len(QueueName::Foo), 2);

        assert_eq!(backend.pop(QueueName::Foo).await.unwrap().as_deref(), Some("a"));
        assert_eq!(backend.pop(QueueName::Foo).await.unwrap().as_deref(), Some("b"));
        assert_eq!(backend.pop(QueueName::Foo).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_ids_increase() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.next_id(QueueName::Foo).await.unwrap(), 1);
        assert_eq!(backend.next_id(QueueName::Foo).await.unwrap(), 2);
    }
}
