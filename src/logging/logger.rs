//! Hierarchical structured logger with trace-correlated records

use super::level::LogLevel;
use super::record::{ErrorDetails, Fields, LogRecord};
use super::transport::{JsonLinesTransport, OtlpTransport, Transport};
use crate::telemetry::{ObservabilityHandles, ServiceInfo, ServiceResource, TraceContext};
use chrono::Utc;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Separator between the segments of a logger name
pub const NAME_SEPARATOR: char = '/';

/// OpenTelemetry instrumentation scope of records sent to the collector
const OTLP_SCOPE: &str = "otel-harness";

/// State shared by every logger of one hierarchy
struct Shared {
    level: LogLevel,
    resource: Arc<ServiceResource>,
    transports: Vec<Arc<dyn Transport>>,
}

/// Structured logger.
///
/// Cheap to clone. Children created with [`StructuredLogger::child`] share
/// the level threshold and the transport set of the logger they were built
/// from; only the name and the bound attributes differ.
#[derive(Clone)]
pub struct StructuredLogger {
    name: Arc<str>,
    bound: Arc<Fields>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("name", &self.name)
            .field("level", &self.shared.level)
            .field("transports", &self.shared.transports.len())
            .finish_non_exhaustive()
    }
}

/// Builder for a root logger
pub struct LoggerBuilder {
    name: String,
    level: Option<LogLevel>,
    resource: Option<Arc<ServiceResource>>,
    transports: Vec<Arc<dyn Transport>>,
}

impl LoggerBuilder {
    /// Threshold; defaults to `LOG_LEVEL`
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn resource(mut self, resource: Arc<ServiceResource>) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn build(self) -> StructuredLogger {
        let resource = self.resource.unwrap_or_else(|| {
            Arc::new(ServiceResource::new(&ServiceInfo::new(
                self.name.clone(),
                env!("CARGO_PKG_VERSION"),
            )))
        });
        StructuredLogger {
            name: Arc::from(self.name),
            bound: Arc::new(Fields::new()),
            shared: Arc::new(Shared {
                level: self.level.unwrap_or_else(LogLevel::from_env),
                resource,
                transports: self.transports,
            }),
        }
    }
}

impl StructuredLogger {
    pub fn builder(name: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder {
            name: name.into(),
            level: None,
            resource: None,
            transports: Vec::new(),
        }
    }

    /// Root logger of a process: stdout JSON lines plus the OTLP log
    /// pipeline owned by `handles`, at the level configured for them.
    pub fn build(name: impl Into<String>, handles: &ObservabilityHandles) -> Self {
        Self::builder(name)
            .level(handles.log_level())
            .resource(handles.resource())
            .transport(Arc::new(JsonLinesTransport::stdout()))
            .transport(Arc::new(OtlpTransport::new(
                handles.logger_provider(),
                OTLP_SCOPE,
            )))
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        self.shared.level
    }

    pub fn resource(&self) -> &ServiceResource {
        &self.shared.resource
    }

    /// Logger named `<self>/<name>` sharing this logger's level and transports
    pub fn child(&self, name: &str) -> StructuredLogger {
        StructuredLogger {
            name: Arc::from(format!("{}{}{}", self.name, NAME_SEPARATOR, name)),
            bound: self.bound.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Same logger with `key` attached to every record it (and its children) emit
    pub fn bind(&self, key: &str, value: impl Serialize) -> StructuredLogger {
        StructuredLogger {
            name: self.name.clone(),
            bound: Arc::new(self.bound.merged(&Fields::new().with(key, value))),
            shared: self.shared.clone(),
        }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level.passes(self.shared.level)
    }

    /// Emit a record at `level`.
    ///
    /// Records for `error`/`fatal` should carry an error; prefer
    /// [`StructuredLogger::error`] and [`StructuredLogger::fatal`].
    pub fn emit(&self, level: LogLevel, message: &str, fields: impl Into<Fields>) {
        self.dispatch(level, message, fields.into(), None);
    }

    pub fn trace(&self, message: &str, fields: impl Into<Fields>) {
        self.emit(LogLevel::Trace, message, fields);
    }

    pub fn debug(&self, message: &str, fields: impl Into<Fields>) {
        self.emit(LogLevel::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: impl Into<Fields>) {
        self.emit(LogLevel::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: impl Into<Fields>) {
        self.emit(LogLevel::Warn, message, fields);
    }

    pub fn error<E>(&self, message: &str, err: &E, fields: impl Into<Fields>)
    where
        E: std::error::Error + ?Sized,
    {
        self.emit_error(LogLevel::Error, message, err, fields);
    }

    pub fn fatal<E>(&self, message: &str, err: &E, fields: impl Into<Fields>)
    where
        E: std::error::Error + ?Sized,
    {
        self.emit_error(LogLevel::Fatal, message, err, fields);
    }

    fn emit_error<E>(&self, level: LogLevel, message: &str, err: &E, fields: impl Into<Fields>)
    where
        E: std::error::Error + ?Sized,
    {
        if !self.enabled(level) {
            return;
        }
        self.dispatch(level, message, fields.into(), Some(ErrorDetails::from_error(err)));
    }

    fn dispatch(&self, level: LogLevel, message: &str, fields: Fields, error: Option<ErrorDetails>) {
        if !self.enabled(level) {
            return;
        }

        let record = LogRecord {
            level,
            logger_name: self.name.clone(),
            message: message.to_string(),
            attributes: self.bound.merged(&fields),
            error,
            tracing: TraceContext::current(),
            time: Utc::now(),
            resource: self.shared.resource.clone(),
        };

        for transport in &self.shared.transports {
            let outcome = catch_unwind(AssertUnwindSafe(|| transport.write(&record)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        transport = transport.name(),
                        logger = %self.name,
                        "Log transport write failed: {}",
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        transport = transport.name(),
                        logger = %self.name,
                        "Log transport panicked while writing"
                    );
                }
            }
        }
    }
}
