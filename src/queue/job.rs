//! Job record stored in the backend and the acknowledgement returned to producers

use super::schema::QueueName;
use super::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Name given to every job
pub const JOB_NAME: &str = "someJobName";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub queue: QueueName,
    pub name: String,
    pub payload: Value,
    /// W3C trace context of the enqueuing span
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id.clone(),
            queue: self.queue,
            name: self.name.clone(),
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Acknowledgement of an accepted job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: String,
    pub queue: QueueName,
    pub name: String,
    pub enqueued_at: DateTime<Utc>,
}
