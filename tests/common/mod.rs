//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use otel_harness::config::{Config, QueueBackendKind, QueueConfig, TelemetryConfig};
use otel_harness::logging::{LogLevel, LogRecord, StructuredLogger, Transport, TransportError};
use otel_harness::queue::{MemoryBackend, QueueBackend, QueueConnectionRegistry, QueueConnector, QueueHandleFactory};
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;

// ============================================================================
// Log capture
// ============================================================================

/// Transport keeping every record it receives
#[derive(Default)]
pub struct CaptureTransport {
    records: Mutex<Vec<LogRecord>>,
}

impl CaptureTransport {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    pub fn find(&self, message: &str) -> Option<LogRecord> {
        self.records().into_iter().find(|r| r.message == message)
    }

    /// Wait up to two seconds for a record with `message`
    pub async fn wait_for(&self, message: &str) -> LogRecord {
        for _ in 0..200 {
            if let Some(record) = self.find(message) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no record with message {:?}, got {:?}", message, self.messages());
    }
}

impl Transport for CaptureTransport {
    fn name(&self) -> &str {
        "capture"
    }

    fn write(&self, record: &LogRecord) -> Result<(), TransportError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct FailingTransport;

impl Transport for FailingTransport {
    fn name(&self) -> &str {
        "failing"
    }

    fn write(&self, _record: &LogRecord) -> Result<(), TransportError> {
        Err(TransportError::Unavailable("collector unreachable".to_string()))
    }
}

pub struct PanickingTransport;

impl Transport for PanickingTransport {
    fn name(&self) -> &str {
        "panicking"
    }

    fn write(&self, _record: &LogRecord) -> Result<(), TransportError> {
        panic!("transport bug");
    }
}

/// Writer whose bytes stay readable after being handed to a transport
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn capture_logger(name: &str, level: LogLevel) -> (StructuredLogger, Arc<CaptureTransport>) {
    let capture = Arc::new(CaptureTransport::default());
    let logger = StructuredLogger::builder(name)
        .level(level)
        .transport(capture.clone())
        .build();
    (logger, capture)
}

// ============================================================================
// Tracing
// ============================================================================

/// Thread-local subscriber bridging spans to an in-memory tracer provider
pub struct TracingGuard {
    _guard: tracing::subscriber::DefaultGuard,
    pub provider: SdkTracerProvider,
}

pub fn init_tracing() -> TracingGuard {
    global::set_text_map_propagator(TraceContextPropagator::new());
    let provider = SdkTracerProvider::builder().build();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("test")));
    TracingGuard {
        _guard: tracing::subscriber::set_default(subscriber),
        provider,
    }
}

// ============================================================================
// Queues
// ============================================================================

/// Connector counting how often the registry asks for a connection
pub struct CountingConnector {
    pub calls: Arc<AtomicUsize>,
    backend: Arc<MemoryBackend>,
}

impl CountingConnector {
    pub fn new(backend: Arc<MemoryBackend>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
                backend,
            },
            calls,
        )
    }
}

#[async_trait]
impl QueueConnector for CountingConnector {
    async fn connect(&self) -> otel_harness::queue::Result<Arc<dyn QueueBackend>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

/// Factory over an in-memory backend; returns the connect counter too
pub fn memory_factory(logger: StructuredLogger) -> (QueueHandleFactory, Arc<MemoryBackend>, Arc<AtomicUsize>) {
    let backend = Arc::new(MemoryBackend::new());
    let (connector, calls) = CountingConnector::new(backend.clone());
    let registry = Arc::new(QueueConnectionRegistry::new(Box::new(connector)));
    (
        QueueHandleFactory::new(registry, logger, Duration::from_millis(5)),
        backend,
        calls,
    )
}

// ============================================================================
// HTTP
// ============================================================================

pub fn test_config(downstream_url: &str) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        downstream_url: downstream_url.to_string(),
        telemetry: TelemetryConfig::local_only(),
        queue: QueueConfig {
            backend: QueueBackendKind::Memory,
            ..QueueConfig::default()
        },
    }
}

/// GET `path`, returning status, headers and the JSON body if any
pub async fn get_json(app: &Router, path: &str, headers: &[(&str, &str)]) -> (StatusCode, HeaderMap, Option<Value>) {
    let mut builder = Request::builder().method(Method::GET).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    if body_bytes.is_empty() {
        return (status, headers, None);
    }

    (status, headers, serde_json::from_slice(&body_bytes).ok())
}
