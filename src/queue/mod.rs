//! Background job queues shared by producer and worker roles
//!
//! One backend connection per process is opened lazily by the
//! [`QueueConnectionRegistry`] and shared by every [`QueueHandle`] and
//! [`Worker`]. Queue names form a closed set, each bound to one payload
//! schema; payloads are checked against it before any backend call.

pub mod backend;
pub mod factory;
pub mod job;
pub mod jobs;
pub mod redis_backend;
pub mod registry;
pub mod schema;
pub mod worker;

pub use backend::{MemoryBackend, QueueBackend};
pub use factory::{QueueHandle, QueueHandleFactory};
pub use job::{JobHandle, JobRecord, JOB_NAME};
pub use registry::{QueueConnectionRegistry, QueueConnector};
pub use schema::{FooJob, JobSchema, PayloadSchema, QueueName};
pub use worker::{Job, Worker};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    #[error("Payload rejected by queue '{queue}': {reason}")]
    Schema { queue: QueueName, reason: String },

    #[error("Queue backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Malformed job record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl QueueError {
    /// Caller errors, detected before any I/O
    pub fn is_rejection(&self) -> bool {
        matches!(self, QueueError::UnknownQueue(_) | QueueError::Schema { .. })
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections() {
        assert!(QueueError::UnknownQueue("bar".into()).is_rejection());
        assert!(QueueError::Schema {
            queue: QueueName::Foo,
            reason: "x".into()
        }
        .is_rejection());
        let codec = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!QueueError::Codec(codec).is_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = QueueError::UnknownQueue("bar".into());
        assert_eq!(err.to_string(), "Unknown queue 'bar'");
    }
}
