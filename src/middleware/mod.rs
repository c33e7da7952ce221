//! HTTP middleware shared by the harness services
//!
//! - `trace`: OpenTelemetry server spans for `TraceLayer`
//! - `request_context`: request id, per-request logger and correlation headers

pub mod request_context;
pub mod trace;

pub use request_context::{request_context_middleware, RequestLogger};
pub use trace::{OtelMakeSpan, OtelOnResponse};
