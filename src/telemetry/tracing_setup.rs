//! OpenTelemetry pipelines and the `tracing` subscriber

use super::resource::ServiceResource;
use crate::config::{OtlpProtocol, TelemetryConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{ExporterBuildError, LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Crates whose spans must never be exported, to keep the exporters from
/// tracing their own network calls.
const EXPORT_SILENCED: &str = "h2=off,hyper=off,hyper_util=off,tonic=off,tower=off,reqwest=off,opentelemetry=off,opentelemetry_sdk=off,opentelemetry_otlp=off";

/// Targets raised to `debug` when `DEBUG_TELEMETRY` is on
const PIPELINE_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "tracing_opentelemetry",
];

/// Build the tracer provider.
///
/// Spans are always sampled so trace ids exist for log correlation; the
/// batch exporter is only attached when trace export is enabled.
pub fn build_tracer_provider(
    resource: &ServiceResource,
    config: &TelemetryConfig,
) -> Result<SdkTracerProvider, ExporterBuildError> {
    let mut builder = SdkTracerProvider::builder().with_resource(resource.to_otel());

    if config.traces_enabled {
        builder = builder.with_batch_exporter(span_exporter(config)?);
    }

    Ok(builder.build())
}

/// Build the logger provider backing the remote log transport
pub fn build_logger_provider(
    resource: &ServiceResource,
    config: &TelemetryConfig,
) -> Result<SdkLoggerProvider, ExporterBuildError> {
    let mut builder = SdkLoggerProvider::builder().with_resource(resource.to_otel());

    if config.logs_enabled {
        builder = builder.with_batch_exporter(log_exporter(config)?);
    }

    Ok(builder.build())
}

fn span_exporter(config: &TelemetryConfig) -> Result<SpanExporter, ExporterBuildError> {
    match config.otlp_protocol {
        OtlpProtocol::HttpProtobuf => SpanExporter::builder()
            .with_http()
            .with_endpoint(config.traces_endpoint())
            .with_timeout(config.export_timeout)
            .build(),
        OtlpProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.traces_endpoint())
            .with_timeout(config.export_timeout)
            .build(),
    }
}

fn log_exporter(config: &TelemetryConfig) -> Result<LogExporter, ExporterBuildError> {
    match config.otlp_protocol {
        OtlpProtocol::HttpProtobuf => LogExporter::builder()
            .with_http()
            .with_endpoint(config.logs_endpoint())
            .with_timeout(config.export_timeout)
            .build(),
        OtlpProtocol::Grpc => LogExporter::builder()
            .with_tonic()
            .with_endpoint(config.logs_endpoint())
            .with_timeout(config.export_timeout)
            .build(),
    }
}

/// Directives of the stderr diagnostics layer: `RUST_LOG` (default `warn`),
/// plus pipeline internals at `debug` when `DEBUG_TELEMETRY` is on.
pub fn diagnostics_directives(rust_log: Option<&str>, debug_telemetry: bool) -> String {
    let mut directives = rust_log
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("warn")
        .to_string();
    if debug_telemetry {
        for target in PIPELINE_TARGETS {
            directives.push_str(&format!(",{}=debug", target));
        }
    }
    directives
}

/// Directives of the span-export layer
pub fn export_directives() -> String {
    format!("info,{}", EXPORT_SILENCED)
}

/// Install the global `tracing` subscriber.
///
/// Composes the OpenTelemetry layer (spans to the tracer provider) with a
/// stderr diagnostics layer, each with its own filter.
pub fn install_subscriber(
    tracer_provider: &SdkTracerProvider,
    service_name: &str,
    config: &TelemetryConfig,
) -> Result<(), TryInitError> {
    let tracer = tracer_provider.tracer(service_name.to_string());
    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(EnvFilter::new(export_directives()));

    let rust_log = std::env::var("RUST_LOG").ok();
    let diagnostics_filter = EnvFilter::new(diagnostics_directives(
        rust_log.as_deref(),
        config.debug_telemetry,
    ));

    // Plain and JSON formatters have different types; box them so the
    // composed subscriber has a single type.
    let diagnostics = if config.json_diagnostics {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(diagnostics.with_filter(diagnostics_filter))
        .try_init()
}
