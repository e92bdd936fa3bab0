//! Caller identity extraction.
//!
//! Authentication itself lives in an upstream gateway; it passes the
//! authenticated subject through the `x-caller-id` header. Requests
//! without it are rejected before any auction logic runs.

use axum::http::HeaderMap;

use crate::api::types::ApiError;

pub const CALLER_HEADER: &str = "x-caller-id";

pub fn require_caller(headers: &HeaderMap) -> std::result::Result<String, ApiError> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {CALLER_HEADER} header")))
}
