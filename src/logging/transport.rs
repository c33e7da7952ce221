//! Destinations a structured logger writes to

use super::record::LogRecord;
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider as _};
use opentelemetry::Key;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use serde_json::Value;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// A sink for log records.
///
/// Implementations must not block on remote I/O: `write` is called inline
/// from `emit` on the caller's task.
pub trait Transport: Send + Sync {
    /// Short name used when reporting a failing transport
    fn name(&self) -> &str;

    fn write(&self, record: &LogRecord) -> Result<(), TransportError>;
}

/// Synchronous newline-delimited JSON sink over any writer
pub struct JsonLinesTransport<W: Write + Send> {
    name: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesTransport<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(writer),
        }
    }
}

impl JsonLinesTransport<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new("stdout", std::io::stdout())
    }
}

impl<W: Write + Send> Transport for JsonLinesTransport<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, record: &LogRecord) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(&record.to_json())?;
        line.push(b'\n');
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| TransportError::Unavailable(format!("writer lock poisoned: {}", e)))?;
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Best-effort remote sink forwarding records to the OTLP log pipeline.
///
/// `emit` only hands the record to the provider's batch processor; export
/// happens on the processor's own thread and failures never reach callers.
pub struct OtlpTransport {
    logger: SdkLogger,
}

impl OtlpTransport {
    pub fn new(provider: &SdkLoggerProvider, scope: &'static str) -> Self {
        Self {
            logger: provider.logger(scope),
        }
    }
}

impl Transport for OtlpTransport {
    fn name(&self) -> &str {
        "otlp"
    }

    fn write(&self, record: &LogRecord) -> Result<(), TransportError> {
        let mut otel = self.logger.create_log_record();
        otel.set_timestamp(record.time.into());
        otel.set_severity_number(record.level.severity());
        otel.set_severity_text(record.level.as_str());
        otel.set_body(AnyValue::from(record.message.clone()));
        otel.add_attribute(Key::from("logger.name"), record.logger_name.to_string());
        for (key, value) in record.attributes.iter() {
            otel.add_attribute(Key::from(key.clone()), json_to_any(value));
        }
        if let Some(err) = &record.error {
            otel.add_attribute(Key::from("exception.type"), err.kind.clone());
            otel.add_attribute(Key::from("exception.message"), err.message.clone());
            if !err.chain.is_empty() {
                otel.add_attribute(Key::from("exception.stacktrace"), err.chain.join("\n"));
            }
        }
        if let Some((trace_id, span_id)) = record.tracing.raw_ids() {
            otel.set_trace_context(trace_id, span_id, None);
        }
        self.logger.emit(otel);
        Ok(())
    }
}

/// Map a JSON value onto the OpenTelemetry attribute model
pub fn json_to_any(value: &Value) -> AnyValue {
    match value {
        Value::Null => AnyValue::String("null".into()),
        Value::Bool(b) => AnyValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AnyValue::Int(i)
            } else {
                AnyValue::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => AnyValue::String(s.clone().into()),
        Value::Array(items) => AnyValue::ListAny(Box::new(items.iter().map(json_to_any).collect())),
        Value::Object(map) => AnyValue::Map(Box::new(
            map.iter()
                .map(|(k, v)| (Key::from(k.clone()), json_to_any(v)))
                .collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::record::Fields;
    use crate::logging::LogLevel;
    use crate::telemetry::{ServiceInfo, ServiceResource, TraceContext};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn record() -> LogRecord {
        LogRecord {
            level: LogLevel::Info,
            logger_name: Arc::from("svc"),
            message: "ready".to_string(),
            attributes: Fields::new().with("port", 3001),
            error: None,
            tracing: TraceContext::EMPTY,
            time: Utc::now(),
            resource: Arc::new(ServiceResource::new(&ServiceInfo::new("svc", "0.1.0"))),
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_lines_writes_one_line_per_record() {
        let transport = JsonLinesTransport::new("buffer", Vec::new());
        transport.write(&record()).unwrap();
        transport.write(&record()).unwrap();

        let buffer = transport.writer.lock().unwrap().clone();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["msg"], "ready");
        assert_eq!(parsed["port"], 3001);
    }

    #[test]
    fn test_json_lines_surfaces_io_errors() {
        let transport = JsonLinesTransport::new("broken", FailingWriter);
        let err = transport.write(&record()).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_json_to_any_scalars() {
        assert_eq!(json_to_any(&json!(true)), AnyValue::Boolean(true));
        assert_eq!(json_to_any(&json!(7)), AnyValue::Int(7));
        assert_eq!(json_to_any(&json!(1.5)), AnyValue::Double(1.5));
        assert_eq!(json_to_any(&json!("x")), AnyValue::String("x".into()));
    }

    #[test]
    fn test_json_to_any_nested() {
        let value = json_to_any(&json!({"job": {"id": "1"}, "tags": ["a"]}));
        match value {
            AnyValue::Map(map) => {
                assert!(map.contains_key(&Key::from("job")));
                assert!(matches!(map.get(&Key::from("tags")), Some(AnyValue::ListAny(_))));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_otlp_transport_accepts_records_without_exporter() {
        let provider = SdkLoggerProvider::builder().build();
        let transport = OtlpTransport::new(&provider, "test");
        assert!(transport.write(&record()).is_ok());
        assert_eq!(transport.name(), "otlp");
    }
}
