//! Span helpers for outbound calls: HTTP client, data access and queue I/O.
//!
//! The HTTP server side lives in `middleware::trace`.

use super::context::{extract_from_metadata, inject_into_headers, inject_into_metadata};
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::time::Duration;
use tracing::field::Empty;
use tracing::{Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Value of `messaging.system` on queue spans
pub const MESSAGING_SYSTEM: &str = "otel-harness";

/// HTTP client whose requests run under a client span and carry the W3C
/// `traceparent` of that span.
#[derive(Clone, Debug)]
pub struct TracedClient {
    inner: reqwest::Client,
}

impl TracedClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { inner })
    }

    /// `GET url` and decode the JSON body
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, reqwest::Error> {
        let span = client_span("GET", url);
        let mut headers = HeaderMap::new();
        inject_into_headers(&span, &mut headers);

        async {
            let response = self.inner.get(url).headers(headers).send().await?;
            let status = response.status();
            Span::current().record("http.response.status_code", status.as_u16());
            if status.is_server_error() {
                Span::current().record("otel.status_code", "ERROR");
            }
            response.error_for_status()?.json::<T>().await
        }
        .instrument(span)
        .await
    }
}

fn client_span(method: &str, url: &str) -> Span {
    tracing::info_span!(
        "http.client",
        otel.name = %method,
        otel.kind = "client",
        otel.status_code = Empty,
        http.request.method = %method,
        url.full = %url,
        http.response.status_code = Empty,
    )
}

/// Client span around one data-access operation.
///
/// ```ignore
/// async { repo.load().await }.instrument(db_span("postgresql", "SELECT")).await
/// ```
pub fn db_span(system: &str, operation: &str) -> Span {
    tracing::info_span!(
        "db",
        otel.name = %format!("{} {}", operation, system),
        otel.kind = "client",
        db.system = %system,
        db.operation = %operation,
    )
}

/// Producer span for one enqueue; the caller injects its context into the
/// job metadata with [`inject_job_context`].
pub fn producer_span(queue: &str) -> Span {
    tracing::info_span!(
        "queue.publish",
        otel.name = %format!("{} publish", queue),
        otel.kind = "producer",
        messaging.system = MESSAGING_SYSTEM,
        messaging.destination.name = %queue,
        messaging.message.id = Empty,
    )
}

/// Consumer span for one dequeued job, parented on the producer's context
pub fn consumer_span(queue: &str, job_id: &str, metadata: &HashMap<String, String>) -> Span {
    let span = tracing::info_span!(
        "queue.process",
        otel.name = %format!("{} process", queue),
        otel.kind = "consumer",
        messaging.system = MESSAGING_SYSTEM,
        messaging.destination.name = %queue,
        messaging.message.id = %job_id,
    );
    let _ = span.set_parent(extract_from_metadata(metadata));
    span
}

/// W3C headers of `span` as job metadata
pub fn inject_job_context(span: &Span) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    inject_into_metadata(span, &mut metadata);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_are_disabled_without_subscriber() {
        assert!(db_span("postgresql", "SELECT").is_disabled());
        assert!(producer_span("foo").is_disabled());
        assert!(consumer_span("foo", "1", &HashMap::new()).is_disabled());
    }

    #[test]
    fn test_inject_without_active_trace_is_empty() {
        let metadata = inject_job_context(&Span::none());
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_client_builds() {
        assert!(TracedClient::new(Duration::from_secs(1)).is_ok());
    }
}
