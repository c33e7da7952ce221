//! Telemetry initialization: trace pipeline, log pipeline and correlation
//!
//! [`setup`] runs once per process and returns the [`ObservabilityHandles`]
//! every other component is built from. Calling it again returns the same
//! handles without registering anything a second time.

pub mod context;
pub mod instrumentation;
pub mod request_id;
pub mod resource;
pub mod tracing_setup;

pub use context::TraceContext;
pub use request_id::{derive_request_id, request_id_for, RequestId};
pub use resource::{ServiceInfo, ServiceResource};

use crate::config::TelemetryConfig;
use crate::logging::LogLevel;
use opentelemetry::global;
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build trace pipeline: {0}")]
    TracePipeline(#[source] ExporterBuildError),

    #[error("failed to build log pipeline: {0}")]
    LogPipeline(#[source] ExporterBuildError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("telemetry already installed for this process")]
    AlreadyInstalled,
}

/// Process-wide telemetry state: the resource and both providers.
///
/// Immutable after construction and shared behind an `Arc`.
pub struct ObservabilityHandles {
    resource: Arc<ServiceResource>,
    tracer_provider: SdkTracerProvider,
    logger_provider: SdkLoggerProvider,
    log_level: LogLevel,
    installed: AtomicBool,
}

impl std::fmt::Debug for ObservabilityHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityHandles")
            .field("resource", &self.resource)
            .field("log_level", &self.log_level)
            .field("installed", &self.installed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ObservabilityHandles {
    /// Build both pipelines without registering anything globally
    pub fn new(service: &ServiceInfo, config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let resource = Arc::new(ServiceResource::new(service));
        let tracer_provider = tracing_setup::build_tracer_provider(&resource, config)
            .map_err(TelemetryError::TracePipeline)?;
        let logger_provider = tracing_setup::build_logger_provider(&resource, config)
            .map_err(TelemetryError::LogPipeline)?;

        Ok(Self {
            resource,
            tracer_provider,
            logger_provider,
            log_level: config.log_level,
            installed: AtomicBool::new(false),
        })
    }

    /// Register the `tracing` subscriber, then the propagator and the
    /// tracer provider. Succeeds at most once per value.
    ///
    /// The subscriber is the only step that can fail, so nothing global is
    /// registered when it does.
    fn install(&self, config: &TelemetryConfig) -> Result<(), TelemetryError> {
        if self.installed.swap(true, Ordering::SeqCst) {
            return Err(TelemetryError::AlreadyInstalled);
        }

        tracing_setup::install_subscriber(
            &self.tracer_provider,
            &self.resource.service_name,
            config,
        )?;
        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(self.tracer_provider.clone());
        Ok(())
    }

    pub fn resource(&self) -> Arc<ServiceResource> {
        self.resource.clone()
    }

    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Flush pending spans and records and stop both pipelines
    pub fn shutdown(&self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("WARN: failed to shut down tracer provider: {}", err);
        }
        if let Err(err) = self.logger_provider.shutdown() {
            eprintln!("WARN: failed to shut down logger provider: {}", err);
        }
    }
}

static HANDLES: OnceLock<Arc<ObservabilityHandles>> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialise the telemetry stack for this process.
///
/// The first call builds and registers the pipelines. Later calls return
/// the handles from the first call unchanged, whatever their arguments.
/// A failure here is fatal for the process.
pub fn setup(
    service: &ServiceInfo,
    config: &TelemetryConfig,
) -> Result<Arc<ObservabilityHandles>, TelemetryError> {
    if let Some(handles) = HANDLES.get() {
        return Ok(handles.clone());
    }

    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handles) = HANDLES.get() {
        return Ok(handles.clone());
    }

    let handles = Arc::new(ObservabilityHandles::new(service, config)?);
    handles.install(config)?;
    let _ = HANDLES.set(handles.clone());
    Ok(handles)
}
