//! Liveness endpoint reporting which service answered

use crate::logging::StructuredLogger;
use crate::middleware::RequestLogger;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub log_level: &'static str,
}

impl HealthResponse {
    fn healthy(logger: &StructuredLogger) -> Self {
        let resource = logger.resource();
        Self {
            status: "healthy",
            service: resource.service_name.clone(),
            version: resource.service_version.clone(),
            log_level: logger.level().as_str(),
        }
    }
}

pub async fn health(RequestLogger(logger): RequestLogger) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(&logger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use serde_json::json;

    #[test]
    fn test_reports_logger_service() {
        let logger = StructuredLogger::builder("secondary-otel-harness")
            .level(LogLevel::Warn)
            .build()
            .child("http");

        let body = serde_json::to_value(HealthResponse::healthy(&logger)).unwrap();
        assert_eq!(
            body,
            json!({
                "status": "healthy",
                "service": "secondary-otel-harness",
                "version": env!("CARGO_PKG_VERSION"),
                "logLevel": "warn",
            })
        );
    }
}
