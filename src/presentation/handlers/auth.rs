use axum::http::HeaderMap;

use crate::presentation::config::Settings;

use super::ApiError;

pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Byte-wise comparison whose running time does not depend on where the
/// inputs diverge.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Admin endpoints require the shared-secret header.
pub fn require_admin(settings: &Settings, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if constant_time_eq(provided.as_bytes(), settings.admin_password.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("invalid admin password"))
    }
}

/// When an API key is configured, native write endpoints require it.
pub fn require_api_key(settings: &Settings, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = settings.api_key.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("invalid api key"))
    }
}
