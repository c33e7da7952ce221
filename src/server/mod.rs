//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::logging::StructuredLogger;
use crate::middleware::{request_context_middleware, OtelMakeSpan, OtelOnResponse};
use crate::queue::jobs::start_workers;
use crate::queue::{QueueConnectionRegistry, QueueHandleFactory, Worker};
use crate::telemetry::instrumentation::TracedClient;
use crate::telemetry::ObservabilityHandles;
use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Timeout of calls to the downstream service
const DOWNSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// State of the front (`app`) service
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub logger: StructuredLogger,
    pub client: TracedClient,
}

/// State of the secondary service
#[derive(Clone)]
pub struct SecondaryState {
    pub config: Arc<Config>,
    pub logger: StructuredLogger,
    pub queues: QueueHandleFactory,
}

/// Wrap `router` in the correlation stack.
///
/// `TraceLayer` is outermost so the request context middleware and the
/// handlers all run inside the request span.
fn with_observability(router: Router, logger: StructuredLogger) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(middleware::from_fn_with_state(
            logger,
            request_context_middleware,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(OtelMakeSpan)
                .on_response(OtelOnResponse),
        )
        .layer(cors)
}

pub fn build_app_router(state: AppState) -> Router {
    let logger = state.logger.clone();
    let router = Router::new()
        .route("/health", get(api::health::health))
        .route("/", get(api::app::root))
        .route("/slow", get(api::app::slow))
        .with_state(state);
    with_observability(router, logger)
}

pub fn build_secondary_router(state: SecondaryState) -> Router {
    let logger = state.logger.clone();
    let router = Router::new()
        .route("/health", get(api::health::health))
        .route("/bar", get(api::secondary::bar))
        .route("/far", get(api::secondary::far))
        .with_state(state);
    with_observability(router, logger)
}

fn root_logger(handles: &ObservabilityHandles) -> StructuredLogger {
    StructuredLogger::build(handles.resource().service_name.clone(), handles)
}

/// Run the front service
pub async fn run_app(config: Config, handles: Arc<ObservabilityHandles>) -> Result<()> {
    let http_logger = root_logger(&handles).child("http");
    let client = TracedClient::new(DOWNSTREAM_TIMEOUT).context("Failed to build HTTP client")?;

    let addr = config.http_addr();
    let state = AppState {
        config: Arc::new(config),
        logger: http_logger.clone(),
        client,
    };
    serve(&addr, build_app_router(state), &http_logger).await
}

/// Run the secondary service with its queue workers
pub async fn run_secondary(config: Config, handles: Arc<ObservabilityHandles>) -> Result<()> {
    let root = root_logger(&handles);

    let registry = Arc::new(QueueConnectionRegistry::from_config(&config.queue));
    registry
        .get()
        .await
        .context("Failed to connect to queue backend")?;

    let http_logger = root.child("http");
    let queues = QueueHandleFactory::new(registry, root, config.queue.poll_timeout);
    let workers = start_workers(&queues);

    let addr = config.http_addr();
    let state = SecondaryState {
        config: Arc::new(config),
        logger: http_logger.clone(),
        queues,
    };
    let result = serve(&addr, build_secondary_router(state), &http_logger).await;

    stop_workers(workers).await;
    result
}

/// Run a standalone worker process until interrupted
pub async fn run_worker(config: Config, handles: Arc<ObservabilityHandles>) -> Result<()> {
    let root = root_logger(&handles);
    let registry = Arc::new(QueueConnectionRegistry::from_config(&config.queue));
    let queues = QueueHandleFactory::new(registry, root.clone(), config.queue.poll_timeout);

    let workers = start_workers(&queues);
    root.info(
        "Workers started",
        serde_json::json!({ "count": workers.len() }),
    );

    shutdown_signal().await;
    stop_workers(workers).await;
    Ok(())
}

async fn serve(addr: &str, app: Router, logger: &StructuredLogger) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    logger.info(
        &format!("Server now listening at: http://{}", listener.local_addr()?),
        (),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn stop_workers(workers: Vec<Worker>) {
    for worker in workers {
        worker.shutdown().await;
    }
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
