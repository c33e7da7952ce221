//! TraceLayer hooks that turn every request into an OpenTelemetry server span.
//!
//! The span continues the trace of an incoming `traceparent` header, so a
//! request forwarded by another service joins the caller's trace.

use crate::telemetry::context::extract_from_headers;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use std::time::Duration;
use tower_http::trace::{MakeSpan, OnResponse};
use tracing::field::Empty;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// `MakeSpan` producing `otel.kind = server` spans parented on the remote
/// context found in the request headers.
#[derive(Clone, Debug, Default)]
pub struct OtelMakeSpan;

impl<B> MakeSpan<B> for OtelMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method();
        let path = request.uri().path();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| path.to_string());

        let span = tracing::info_span!(
            "request",
            otel.name = %format!("{} {}", method, route),
            otel.kind = "server",
            otel.status_code = Empty,
            http.request.method = %method,
            http.route = %route,
            url.path = %path,
            http.response.status_code = Empty,
        );

        // Only a remote parent is adopted; without one the span starts a new trace.
        let _ = span.set_parent(extract_from_headers(request.headers()));
        span
    }
}

/// `OnResponse` recording the status code on the request span
#[derive(Clone, Debug, Default)]
pub struct OtelOnResponse;

impl<B> OnResponse<B> for OtelOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status();
        span.record("http.response.status_code", status.as_u16());
        if status.is_server_error() {
            span.record("otel.status_code", "ERROR");
        }
        tracing::debug!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "finished processing request"
        );
    }
}
