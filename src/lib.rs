//! otel-harness - trace-correlated logging and background jobs
//!
//! This crate provides the observability layer shared by the harness
//! services (telemetry bootstrap, structured logger, request correlation)
//! together with the job queue used by the producer and worker roles.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod queue;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use logging::{LogLevel, StructuredLogger};
pub use telemetry::{setup, ObservabilityHandles, ServiceInfo};
