//! Secondary service: downstream target and job producer

use crate::error::Result;
use crate::middleware::RequestLogger;
use crate::queue::FooJob;
use crate::server::SecondaryState;
use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Map, Value};

pub async fn bar(RequestLogger(logger): RequestLogger, headers: HeaderMap) -> Json<Value> {
    let http_headers: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();
    logger.debug(
        "Secondary service incoming headers",
        json!({ "httpHeaders": http_headers }),
    );
    Json(json!({ "service": 1 }))
}

pub async fn far(
    State(state): State<SecondaryState>,
    RequestLogger(logger): RequestLogger,
) -> Result<Json<Value>> {
    let job = state
        .queues
        .with_logger(logger)
        .enqueue(&FooJob::default())
        .await?;
    Ok(Json(json!({ "job": job })))
}
