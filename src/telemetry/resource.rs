//! Identity of the running service, attached to every span and log record

use opentelemetry::KeyValue;
use serde::Serialize;

/// Bootstrap input: name and version of the running service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// This crate's package metadata with a role suffix, e.g. `otel-harness-app`
    pub fn for_role(role: &str) -> Self {
        Self::new(
            format!("{}-{}", env!("CARGO_PKG_NAME"), role),
            env!("CARGO_PKG_VERSION"),
        )
    }
}

/// Immutable resource description shared by the trace and log pipelines.
///
/// Built once during bootstrap and handed out behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceResource {
    #[serde(rename = "service.name")]
    pub service_name: String,
    #[serde(rename = "service.version")]
    pub service_version: String,
}

impl ServiceResource {
    pub fn new(info: &ServiceInfo) -> Self {
        Self {
            service_name: info.name.clone(),
            service_version: info.version.clone(),
        }
    }

    pub fn to_otel(&self) -> opentelemetry_sdk::Resource {
        opentelemetry_sdk::Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new(
                "service.version",
                self.service_version.clone(),
            ))
            .build()
    }
}
