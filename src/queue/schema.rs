//! Queue names and the payload schema bound to each of them

use super::QueueError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Every queue this system knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Foo,
}

impl QueueName {
    pub const ALL: &'static [QueueName] = &[QueueName::Foo];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Foo => "foo",
        }
    }

    /// Schema of the payloads accepted by this queue
    pub fn schema(&self) -> PayloadSchema {
        match self {
            QueueName::Foo => PayloadSchema::of::<FooJob>(),
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| QueueError::UnknownQueue(s.to_string()))
    }
}

/// A payload type bound to exactly one queue.
pub trait JobSchema: Serialize + DeserializeOwned + Send + Sync + 'static {
    const QUEUE: QueueName;

    /// Constraints serde cannot express
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Payload of the `foo` queue. `bar` must be `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FooJob {
    pub bar: bool,
}

impl Default for FooJob {
    fn default() -> Self {
        Self { bar: true }
    }
}

impl JobSchema for FooJob {
    const QUEUE: QueueName = QueueName::Foo;

    fn check(&self) -> Result<(), String> {
        if self.bar {
            Ok(())
        } else {
            Err("`bar` must be true".to_string())
        }
    }
}

/// Type-erased validator for the payloads of one queue
#[derive(Clone, Copy)]
pub struct PayloadSchema {
    queue: QueueName,
    validate: fn(&Value) -> Result<(), String>,
}

impl fmt::Debug for PayloadSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadSchema").field("queue", &self.queue).finish()
    }
}

impl PayloadSchema {
    pub fn of<J: JobSchema>() -> Self {
        Self {
            queue: J::QUEUE,
            validate: validate_as::<J>,
        }
    }

    pub fn queue(&self) -> QueueName {
        self.queue
    }

    pub fn validate_value(&self, payload: &Value) -> Result<(), QueueError> {
        (self.validate)(payload).map_err(|reason| QueueError::Schema {
            queue: self.queue,
            reason,
        })
    }
}

fn validate_as<J: JobSchema>(payload: &Value) -> Result<(), String> {
    parse_as::<J>(payload).map(|_| ())
}

/// Payloads are JSON objects; serde would otherwise also accept a struct
/// written as a sequence of its fields.
fn parse_as<J: JobSchema>(payload: &Value) -> Result<J, String> {
    if !payload.is_object() {
        return Err(format!("payload must be a JSON object, got {}", json_kind(payload)));
    }
    let job = J::deserialize(payload).map_err(|e| e.to_string())?;
    job.check()?;
    Ok(job)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode and check a payload of type `J`
pub fn decode_payload<J: JobSchema>(payload: &Value) -> Result<J, QueueError> {
    parse_as::<J>(payload).map_err(|reason| QueueError::Schema {
        queue: J::QUEUE,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_queue_name_parse() {
        assert_eq!("foo".parse::<QueueName>().unwrap(), QueueName::Foo);
        let err = "bar".parse::<QueueName>().unwrap_err();
        assert!(matches!(err, QueueError::UnknownQueue(name) if name == "bar"));
    }

    #[test]
    fn test_queue_name_is_case_sensitive() {
        assert!("Foo".parse::<QueueName>().is_err());
    }

    #[test]
    fn test_queue_name_serde() {
        assert_eq!(serde_json::to_value(QueueName::Foo).unwrap(), json!("foo"));
    }

    #[test]
    fn test_schema_bound_to_queue() {
        assert_eq!(QueueName::Foo.schema().queue(), QueueName::Foo);
    }

    #[rstest]
    #[case(json!({"bar": false}))]
    #[case(json!({}))]
    #[case(json!({"bar": "true"}))]
    #[case(json!({"bar": true, "extra": 1}))]
    #[case(json!([true]))]
    #[case(json!(null))]
    fn test_foo_schema_rejects(#[case] payload: Value) {
        let err = QueueName::Foo.schema().validate_value(&payload).unwrap_err();
        assert!(matches!(err, QueueError::Schema { queue: QueueName::Foo, .. }));
    }

    #[test]
    fn test_foo_schema_accepts_literal_true() {
        assert!(QueueName::Foo
            .schema()
            .validate_value(&json!({"bar": true}))
            .is_ok());
    }

    #[test]
    fn test_decode_payload() {
        let job: FooJob = decode_payload(&json!({"bar": true})).unwrap();
        assert_eq!(job, FooJob::default());
        assert!(decode_payload::<FooJob>(&json!({"bar": false})).is_err());
    }

    #[test]
    fn test_sequence_payload_is_not_a_job() {
        let err = decode_payload::<FooJob>(&json!([true])).unwrap_err();
        match err {
            QueueError::Schema { queue, reason } => {
                assert_eq!(queue, QueueName::Foo);
                assert_eq!(reason, "payload must be a JSON object, got an array");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
