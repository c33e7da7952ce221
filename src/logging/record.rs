//! Log records and their attributes

use super::level::LogLevel;
use crate::telemetry::{ServiceResource, TraceContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Structured attributes attached to a record.
///
/// Built from a JSON object (`json!({..})`), from `()` for "no attributes",
/// or incrementally with [`Fields::with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one attribute. Values that fail to serialise are recorded as their
    /// serialisation error so the record is never dropped.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)));
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Entries of `other` override entries of `self`
    pub fn merged(&self, other: &Fields) -> Fields {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            merged.insert(k.clone(), v.clone());
        }
        Fields(merged)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<()> for Fields {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Map<String, Value>> for Fields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Objects are flattened into attributes; `null` means no attributes; any
/// other value is kept under the `value` key.
impl From<Value> for Fields {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            other => Self::default().with("value", other),
        }
    }
}

/// Error attached to `error`/`fatal` records, rendered separately from the
/// ordinary attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    /// Messages of the `source()` chain, outermost first (excluding `message`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl ErrorDetails {
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: short_type_name(std::any::type_name::<E>()),
            message: err.to_string(),
            chain,
        }
    }
}

fn short_type_name(full: &str) -> String {
    // `dyn core::error::Error + Send + Sync` -> `Error`
    if let Some(object) = full.strip_prefix("dyn ") {
        let principal = object.split(" + ").next().unwrap_or(object);
        return short_type_name(principal);
    }
    // `my_crate::error::AppError` -> `AppError`; generic arguments are kept
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    format!("{}{}", short, &full[base.len()..])
}

/// One emitted log record.
///
/// `tracing` holds the trace active when the record was emitted.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub logger_name: Arc<str>,
    pub message: String,
    pub attributes: Fields,
    pub error: Option<ErrorDetails>,
    pub tracing: TraceContext,
    pub time: DateTime<Utc>,
    pub resource: Arc<ServiceResource>,
}

/// Keys of the line format that attributes may not override
const RESERVED_KEYS: &[&str] = &[
    "level",
    "levelLabel",
    "time",
    "name",
    "msg",
    "tracing",
    "resource",
    "err",
];

impl LogRecord {
    /// Render as one JSON object in the newline-delimited line format.
    ///
    /// Attributes are flattened next to the fixed keys; an attribute whose
    /// name collides with a fixed key is kept under `attr.<key>`.
    pub fn to_json(&self) -> Value {
        let mut line = Map::new();
        line.insert("level".into(), Value::from(self.level.number()));
        line.insert("levelLabel".into(), Value::from(self.level.as_str()));
        line.insert("time".into(), Value::from(self.time.timestamp_millis()));
        line.insert("name".into(), Value::from(&*self.logger_name));
        line.insert("msg".into(), Value::from(self.message.as_str()));
        line.insert(
            "tracing".into(),
            serde_json::to_value(self.tracing).unwrap_or(Value::Null),
        );
        line.insert(
            "resource".into(),
            serde_json::to_value(&*self.resource).unwrap_or(Value::Null),
        );
        for (key, value) in self.attributes.iter() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                line.insert(format!("attr.{}", key), value.clone());
            } else {
                line.insert(key.clone(), value.clone());
            }
        }
        if let Some(err) = &self.error {
            line.insert(
                "err".into(),
                serde_json::to_value(err).unwrap_or(Value::Null),
            );
        }
        Value::Object(line)
    }
}
