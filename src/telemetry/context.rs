//! Access to the active trace context and W3C propagation carriers

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceId};
use opentelemetry::{global, Context};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Trace and span identifiers of the active span.
///
/// Either both identifiers are present or neither is. Derived on demand by
/// [`TraceContext::current`], never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceContext(Option<TraceIds>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TraceIds {
    trace_id: TraceId,
    span_id: SpanId,
}

impl TraceContext {
    pub const EMPTY: TraceContext = TraceContext(None);

    /// Read the trace active at the call site.
    ///
    /// The current `tracing` span is consulted first; when it carries no
    /// valid OpenTelemetry context the ambient [`Context::current`] is used.
    pub fn current() -> Self {
        let from_span = Self::from_context(&tracing::Span::current().context());
        if from_span.is_active() {
            return from_span;
        }
        Self::from_context(&Context::current())
    }

    pub fn from_context(cx: &Context) -> Self {
        Self::from_span_context(cx.span().span_context())
    }

    /// Invalid span contexts (all-zero ids) map to the empty context
    pub fn from_span_context(span_context: &SpanContext) -> Self {
        if !span_context.is_valid() {
            return Self::EMPTY;
        }
        Self(Some(TraceIds {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
        }))
    }

    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    /// Lowercase hex trace id
    pub fn trace_id(&self) -> Option<String> {
        self.0.map(|ids| ids.trace_id.to_string())
    }

    /// Lowercase hex span id
    pub fn span_id(&self) -> Option<String> {
        self.0.map(|ids| ids.span_id.to_string())
    }

    pub fn raw_ids(&self) -> Option<(TraceId, SpanId)> {
        self.0.map(|ids| (ids.trace_id, ids.span_id))
    }
}

impl Serialize for TraceContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("TraceContext", 2)?;
        state.serialize_field("traceId", &self.trace_id())?;
        state.serialize_field("spanId", &self.span_id())?;
        state.end()
    }
}

/// Read-only view over HTTP headers for trace context extraction
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Mutable view over HTTP headers for trace context injection
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Parent context carried by incoming request headers
pub fn extract_from_headers(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Write the context of `span` into outgoing request headers
pub fn inject_into_headers(span: &tracing::Span, headers: &mut HeaderMap) {
    let cx = span.context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderInjector(headers));
    });
}

/// Context stored in job metadata by the producer
pub fn extract_from_metadata(metadata: &HashMap<String, String>) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(metadata))
}

/// Serialise the context of `span` into job metadata
pub fn inject_into_metadata(span: &tracing::Span, metadata: &mut HashMap<String, String>) {
    let cx = span.context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, metadata);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{TraceFlags, TraceState};

    fn span_context(trace: &str, span: &str) -> SpanContext {
        SpanContext::new(
            TraceId::from_hex(trace).unwrap(),
            SpanId::from_hex(span).unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    #[test]
    fn test_empty_context_without_span() {
        let cx = TraceContext::current();
        assert!(!cx.is_active());
        assert_eq!(cx.trace_id(), None);
        assert_eq!(cx.span_id(), None);
    }

    #[test]
    fn test_all_zero_ids_are_empty() {
        let cx = TraceContext::from_span_context(&SpanContext::empty_context());
        assert_eq!(cx, TraceContext::EMPTY);
    }

    #[test]
    fn test_valid_ids_are_hex_encoded() {
        let cx = TraceContext::from_span_context(&span_context("abc123", "def456"));
        assert_eq!(
            cx.trace_id().as_deref(),
            Some("00000000000000000000000000abc123")
        );
        assert_eq!(cx.span_id().as_deref(), Some("0000000000def456"));
    }

    #[test]
    fn test_current_reads_attached_context() {
        let sc = span_context("1111", "2222");
        let _guard = Context::new().with_remote_span_context(sc).attach();

        let cx = TraceContext::current();
        assert!(cx.is_active());
        assert_eq!(
            cx.raw_ids(),
            Some((
                TraceId::from_hex("1111").unwrap(),
                SpanId::from_hex("2222").unwrap()
            ))
        );
    }

    #[test]
    fn test_serialize_empty_as_nulls() {
        let json = serde_json::to_value(TraceContext::EMPTY).unwrap();
        assert_eq!(json, serde_json::json!({"traceId": null, "spanId": null}));
    }

    #[test]
    fn test_serialize_active() {
        let json = serde_json::to_value(TraceContext::from_span_context(&span_context("1", "2"))).unwrap();
        assert_eq!(json["traceId"], "00000000000000000000000000000001");
        assert_eq!(json["spanId"], "0000000000000002");
    }

    #[test]
    fn test_header_injector_skips_invalid_values() {
        let mut headers = HeaderMap::new();
        let mut injector = HeaderInjector(&mut headers);
        injector.set("traceparent", "00-abc-def-01".to_string());
        injector.set("bad header", "x".to_string());
        assert_eq!(headers.len(), 1);
        assert_eq!(HeaderExtractor(&headers).get("traceparent"), Some("00-abc-def-01"));
    }
}
