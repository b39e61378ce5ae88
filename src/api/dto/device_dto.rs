//! Device and health response bodies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::DeviceView;

/// Response body for `GET /api/v1/devices`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceListResponse {
    /// Devices in registration order.
    pub devices: Vec<DeviceView>,
    /// Number of devices.
    pub count: usize,
    /// Number of devices currently online.
    pub online: usize,
}

impl DeviceListResponse {
    /// Builds the response from device views.
    #[must_use]
    pub fn new(devices: Vec<DeviceView>) -> Self {
        let online = devices.iter().filter(|d| d.online).count();
        Self {
            count: devices.len(),
            online,
            devices,
        }
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"` when the process answers.
    pub status: String,
    /// Current server time (RFC 3339).
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Registered devices.
    pub devices: usize,
    /// Live observer connections.
    pub connections: usize,
}
