//! REST API layer: read-only device endpoints and health.
//!
//! Device state changes only through the observer protocol; the REST
//! surface exposes snapshots for dashboards and probes.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "devhub", description = "Device presence registry and observer relay"),
    paths(
        handlers::system::health_handler,
        handlers::devices::list_devices,
        handlers::devices::get_device,
    ),
    components(schemas(
        dto::DeviceListResponse,
        dto::HealthResponse,
        crate::domain::DeviceView,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Health and diagnostics"),
        (name = "Devices", description = "Registered device snapshots"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
