//! Configuration management for the harness services

use crate::logging::LogLevel;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default OTLP collector base endpoint (OTLP/HTTP port).
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Base URL of the downstream service called by the `app` role
    pub downstream_url: String,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
    /// Job queue configuration
    pub queue: QueueConfig,
}

/// Wire protocol used by the OTLP exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpProtocol {
    /// OTLP over HTTP with protobuf bodies (`/v1/traces`, `/v1/logs`)
    HttpProtobuf,
    /// OTLP over gRPC
    Grpc,
}

impl OtlpProtocol {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http/protobuf" | "http" => Ok(Self::HttpProtobuf),
            "grpc" => Ok(Self::Grpc),
            other => anyhow::bail!("Invalid OTEL_EXPORTER_OTLP_PROTOCOL '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Collector base endpoint, without signal path
    pub otlp_endpoint: String,
    pub otlp_protocol: OtlpProtocol,
    /// Export finished spans to the collector
    pub traces_enabled: bool,
    /// Export log records to the collector
    pub logs_enabled: bool,
    /// Per-request timeout of the OTLP exporters
    pub export_timeout: Duration,
    /// Verbose diagnostics of the telemetry pipeline itself (`DEBUG_TELEMETRY`)
    pub debug_telemetry: bool,
    /// Minimum level of the structured logger (`LOG_LEVEL`)
    pub log_level: LogLevel,
    /// Emit diagnostics (stderr) as JSON instead of plain text
    pub json_diagnostics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            otlp_protocol: OtlpProtocol::HttpProtobuf,
            traces_enabled: true,
            logs_enabled: true,
            export_timeout: Duration::from_millis(1_000),
            debug_telemetry: false,
            log_level: LogLevel::Info,
            json_diagnostics: false,
        }
    }
}

impl TelemetryConfig {
    /// Configuration with both exporters switched off. Spans are still
    /// created and sampled, so trace correlation keeps working locally.
    pub fn local_only() -> Self {
        Self {
            traces_enabled: false,
            logs_enabled: false,
            ..Self::default()
        }
    }

    /// Endpoint for span export
    pub fn traces_endpoint(&self) -> String {
        self.signal_endpoint("traces")
    }

    /// Endpoint for log export
    pub fn logs_endpoint(&self) -> String {
        self.signal_endpoint("logs")
    }

    fn signal_endpoint(&self, signal: &str) -> String {
        let base = self.otlp_endpoint.trim_end_matches('/');
        match self.otlp_protocol {
            OtlpProtocol::HttpProtobuf => format!("{}/v1/{}", base, signal),
            OtlpProtocol::Grpc => base.to_string(),
        }
    }
}

/// Which job queue backend to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackendKind {
    Redis,
    /// In-process queue; producer and worker must share one process
    Memory,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackendKind,
    pub redis_url: String,
    /// How long a worker waits on an empty queue before polling again
    pub poll_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackendKind::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            poll_timeout: Duration::from_secs(1),
        }
    }
}

/// Parse a boolean toggle such as `DEBUG_TELEMETRY`: `1` or
/// `true` in any case enables it, everything else disables it.
pub fn parse_toggle(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn env_toggle(key: &str, default: bool) -> bool {
    env::var(key).map(|s| parse_toggle(&s)).unwrap_or(default)
}

/// Parse `key` when set; a malformed value is an error, not the default
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());
        Url::parse(&otlp_endpoint).context("Invalid OTEL_EXPORTER_OTLP_ENDPOINT")?;

        let otlp_protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
            Ok(value) => OtlpProtocol::parse(&value)?,
            Err(_) => OtlpProtocol::HttpProtobuf,
        };

        let backend = match env::var("QUEUE_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => QueueBackendKind::Redis,
            "memory" => QueueBackendKind::Memory,
            other => anyhow::bail!("Invalid QUEUE_BACKEND '{}'", other),
        };

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_parse("HTTP_PORT", 3000)?,
            downstream_url: env::var("DOWNSTREAM_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            telemetry: TelemetryConfig {
                otlp_endpoint,
                otlp_protocol,
                traces_enabled: env_toggle("OTEL_TRACES_ENABLED", true),
                logs_enabled: env_toggle("OTEL_LOGS_ENABLED", true),
                export_timeout: Duration::from_millis(env_parse("OTEL_EXPORT_TIMEOUT_MS", 1_000)?),
                debug_telemetry: env_toggle("DEBUG_TELEMETRY", false),
                log_level: LogLevel::from_env(),
                json_diagnostics: env::var("LOG_FORMAT")
                    .map(|s| s.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            queue: QueueConfig {
                backend,
                redis_url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                poll_timeout: Duration::from_secs(env_parse("QUEUE_POLL_TIMEOUT_SECS", 1)?),
            },
        })
    }

    /// Get HTTP server address; IPv6 hosts are bracketed
    pub fn http_addr(&self) -> String {
        if self.http_host.contains(':') && !self.http_host.starts_with('[') {
            format!("[{}]:{}", self.http_host, self.http_port)
        } else {
            format!("{}:{}", self.http_host, self.http_port)
        }
    }
}
