//! Structured, trace-correlated application logging
//!
//! Every record is stamped with the trace active at the moment it is emitted
//! and fanned out to each transport independently:
//! - `JsonLinesTransport` writes newline-delimited JSON to stdout
//! - `OtlpTransport` forwards to the OTLP log pipeline
//!
//! A failing transport is reported through `tracing` diagnostics and never
//! affects the other transports or the caller.

pub mod level;
pub mod logger;
pub mod record;
pub mod transport;

pub use level::LogLevel;
pub use logger::{LoggerBuilder, StructuredLogger};
pub use record::{ErrorDetails, Fields, LogRecord};
pub use transport::{JsonLinesTransport, OtlpTransport, Transport, TransportError};
