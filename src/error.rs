//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] is the central error type for the hub. Per-message
//! rejections never reach the sender by default; the HTTP mapping only
//! applies to the read-only REST surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::DeviceId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "unknown device: lamp-1",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Hub error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                 |
/// |-----------|--------------------|-----------------------------|
/// | 1000–1999 | Inbound validation | 400 Bad Request             |
/// | 2000–2999 | Unknown entity     | 404 Not Found / 409 Conflict|
/// | 3000–3999 | Server / startup   | 500 Internal Server Error   |
/// | 4000–4999 | Transport          | 502 Bad Gateway             |
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A single frame could not be decoded.
    #[error("malformed frame: {0}")]
    Parse(String),

    /// A decoded message is missing mandatory fields or has an unknown type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// No device with the given id is registered.
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The device exists but has no control with the given id.
    #[error("unknown control {control_id} on device {device_id}")]
    UnknownControl {
        /// Device that was addressed.
        device_id: DeviceId,
        /// Control id that was not found.
        control_id: String,
    },

    /// The device exists but is not online.
    #[error("device offline: {0}")]
    DeviceOffline(DeviceId),

    /// Connection-level I/O failure. Tears down that connection only.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device transport failed to deliver a command.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// A listener could not be bound at startup.
    #[error("failed to bind listener on {addr}: {source}")]
    ListenerBind {
        /// Address the bind was attempted on.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Parse(_) => 1001,
            Self::InvalidMessage(_) => 1002,
            Self::UnknownDevice(_) => 2001,
            Self::UnknownControl { .. } => 2002,
            Self::DeviceOffline(_) => 2003,
            Self::Internal(_) => 3000,
            Self::ListenerBind { .. } => 3001,
            Self::Config(_) => 3002,
            Self::Transport(_) => 4001,
            Self::Delivery(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Parse(_) | Self::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            Self::UnknownDevice(_) | Self::UnknownControl { .. } => StatusCode::NOT_FOUND,
            Self::DeviceOffline(_) => StatusCode::CONFLICT,
            Self::Transport(_) | Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            Self::ListenerBind { .. } | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn unknown_device_maps_to_not_found() {
        let err = HubError::UnknownDevice(DeviceId::from("lamp-1"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2001);
        assert_eq!(err.to_string(), "unknown device: lamp-1");
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let Err(json_err) = serde_json::from_str::<serde_json::Value>("{nope") else {
            panic!("expected invalid json");
        };
        let err = HubError::from(json_err);
        assert!(matches!(err, HubError::Parse(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn into_response_sets_status() {
        let response = HubError::DeviceOffline(DeviceId::from("x")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
