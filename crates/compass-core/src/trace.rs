//! Request trace IDs for log correlation.

use uuid::Uuid;

/// Header used to propagate trace IDs in and out of the service.
pub const TRACE_HEADER: &str = "x-trace-id";

/// Opaque per-request trace identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_value(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
