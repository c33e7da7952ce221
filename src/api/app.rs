//! Front service: calls the secondary service through the traced client

use crate::error::Result;
use crate::middleware::RequestLogger;
use crate::server::AppState;
use crate::telemetry::instrumentation::db_span;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::Instrument;

/// Artificial latency of `/slow`, spent inside a data-access span
pub const SLOW_QUERY_DELAY: Duration = Duration::from_millis(250);

pub async fn root(
    State(state): State<AppState>,
    RequestLogger(logger): RequestLogger,
) -> Result<Json<Value>> {
    let downstream = call_downstream(&state).await?;
    logger.info("Downstream call finished", json!({ "route": "/" }));
    Ok(Json(json!({ "hello": "world", "downstream": downstream })))
}

pub async fn slow(
    State(state): State<AppState>,
    RequestLogger(logger): RequestLogger,
) -> Result<Json<Value>> {
    tokio::time::sleep(SLOW_QUERY_DELAY)
        .instrument(db_span("postgresql", "SELECT"))
        .await;

    let downstream = call_downstream(&state).await?;
    logger.info(
        "Downstream call finished",
        json!({ "route": "/slow", "delayMs": SLOW_QUERY_DELAY.as_millis() as u64 }),
    );
    Ok(Json(json!({ "hello": "world", "downstream": downstream })))
}

async fn call_downstream(state: &AppState) -> Result<Value> {
    let url = format!("{}/bar", state.config.downstream_url.trim_end_matches('/'));
    Ok(state.client.get_json::<Value>(&url).await?)
}
