//! Device read handlers: list and get.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::DeviceListResponse;
use crate::app_state::AppState;
use crate::domain::{Device, DeviceId};
use crate::error::{ErrorResponse, HubError};

/// `GET /devices` — List all registered devices.
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    tag = "Devices",
    summary = "List devices",
    description = "Returns every registered device in registration order, including offline ones awaiting eviction.",
    responses(
        (status = 200, description = "Device list", body = DeviceListResponse),
    )
)]
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let devices = state.registry.snapshot().await;
    Json(DeviceListResponse::new(
        devices.iter().map(Device::view).collect(),
    ))
}

/// `GET /devices/{device_id}` — Get a single device.
///
/// # Errors
///
/// Returns [`HubError::UnknownDevice`] if no device has this id.
#[utoipa::path(
    get,
    path = "/api/v1/devices/{device_id}",
    tag = "Devices",
    summary = "Get device",
    description = "Returns one registered device.",
    params(
        ("device_id" = String, Path, description = "Device identifier"),
    ),
    responses(
        (status = 200, description = "Device found", body = crate::domain::DeviceView),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, HubError> {
    let id = DeviceId::from(device_id);
    let device = state
        .registry
        .get(&id)
        .await
        .ok_or(HubError::UnknownDevice(id))?;
    Ok(Json(device.view()))
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/{device_id}", get(get_device))
}
