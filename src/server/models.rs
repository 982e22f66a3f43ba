use serde::{Deserialize, Serialize};

use crate::request::{JsonMap, RequestMethod, UnknownMethod};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub service: String,
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            service: "apitree".to_string(),
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error returned before resolution starts, when the HTTP request itself is
/// unusable.
#[derive(Debug, Serialize)]
pub struct RejectedRequest {
    pub ok: bool,
    pub code: u16,
    pub msg: String,
}

impl RejectedRequest {
    pub fn new(code: u16, msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            code,
            msg: msg.into(),
        }
    }
}

/// URL segments are matched case-insensitively: `/get` and `/GET` both work.
pub fn method_from_path(segment: &str) -> Result<RequestMethod, UnknownMethod> {
    segment.to_ascii_uppercase().parse()
}

/// Request bodies must be JSON objects.
pub fn request_body(value: serde_json::Value) -> Option<JsonMap> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}
