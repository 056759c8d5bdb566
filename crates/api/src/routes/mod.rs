//! Route handlers.

pub mod admin;
pub mod health;
pub mod orders;
pub mod otp;
pub mod payments;

use axum::http::HeaderMap;
use common::GuestId;

use crate::error::ApiError;

/// Parses the optional `x-guest-id` header.
pub(crate) fn guest_id(headers: &HeaderMap) -> Result<Option<GuestId>, ApiError> {
    match headers.get("x-guest-id") {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("invalid x-guest-id header".to_string()))?;
            let uuid = uuid::Uuid::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid x-guest-id header: {e}")))?;
            Ok(Some(GuestId::from_uuid(uuid)))
        }
    }
}

/// Requires the `x-guest-id` header.
pub(crate) fn require_guest(headers: &HeaderMap) -> Result<GuestId, ApiError> {
    guest_id(headers)?
        .ok_or_else(|| ApiError::Unauthorized("missing x-guest-id header".to_string()))
}

/// Requires a matching `x-admin-token` header.
pub(crate) fn require_admin(headers: &HeaderMap, token: &str) -> Result<(), ApiError> {
    let provided = headers.get("x-admin-token").and_then(|v| v.to_str().ok());
    if provided == Some(token) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".to_string()))
    }
}
