//! Request correlation middleware
//!
//! Runs inside the request span created by `TraceLayer`, derives the request
//! id from the active trace and hands every handler a logger bound to it.

use crate::logging::StructuredLogger;
use crate::telemetry::{request_id_for, RequestId, TraceContext};
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("trace-id");
pub const SPAN_ID_HEADER: HeaderName = HeaderName::from_static("span-id");

/// Per-request logger carrying the `reqId` attribute
#[derive(Clone, Debug)]
pub struct RequestLogger(pub StructuredLogger);

impl<S: Send + Sync> FromRequestParts<S> for RequestLogger {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestLogger>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Attach `RequestId` and `RequestLogger` extensions and echo the
/// correlation headers on the response.
pub async fn request_context_middleware(
    State(logger): State<StructuredLogger>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let trace = TraceContext::current();
    let request_id = request_id_for(&trace);

    request
        .extensions_mut()
        .insert(RequestLogger(logger.bind("reqId", &request_id)));
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let (Some(trace_id), Some(span_id)) = (trace.trace_id(), trace.span_id()) {
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            headers.insert(TRACE_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&span_id) {
            headers.insert(SPAN_ID_HEADER, value);
        }
    }

    response
}
