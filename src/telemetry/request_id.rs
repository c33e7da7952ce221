//! Per-request correlation identifiers

use super::context::TraceContext;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

/// Prefix of identifiers generated when no trace is active
pub const UNSET_PREFIX: &str = "unset-";

const FALLBACK_LEN: usize = 12;

/// Correlation id of one HTTP request, stored as a request extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request id for the trace active at the call site
pub fn derive_request_id() -> String {
    request_id_for(&TraceContext::current())
}

/// The trace id verbatim, or `unset-` followed by 12 random alphanumerics.
///
/// The fallback is not meant to be unguessable.
pub fn request_id_for(context: &TraceContext) -> String {
    match context.trace_id() {
        Some(trace_id) => trace_id,
        None => {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(FALLBACK_LEN)
                .map(char::from)
                .collect();
            format!("{}{}", UNSET_PREFIX, suffix)
        }
    }
}
