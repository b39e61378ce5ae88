//! Listener setup and process lifecycle.
//!
//! [`serve`] runs the HTTP/WebSocket listener, the optional TCP listener,
//! and the presence monitor until the shared shutdown token fires, then
//! waits for every task and empties the live-connection set.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::error::HubError;
use crate::ws::handler::ws_handler;
use crate::ws::tcp;

/// Builds the HTTP router: REST endpoints plus the WebSocket upgrade at
/// `/` and `/ws`.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(api::build_router())
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds a TCP listener.
///
/// # Errors
///
/// Returns [`HubError::ListenerBind`] if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, HubError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| HubError::ListenerBind {
            addr: addr.to_string(),
            source,
        })
}

/// Serves until `state.shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`HubError::Transport`] if the HTTP server fails.
pub async fn serve(
    http: TcpListener,
    line_listener: Option<TcpListener>,
    state: AppState,
) -> Result<(), HubError> {
    let shutdown = state.shutdown.clone();
    let presence = tokio::spawn(state.presence.clone().run(shutdown.clone()));
    let line_task =
        line_listener.map(|listener| tokio::spawn(tcp::accept_loop(listener, state.clone())));

    if let Ok(addr) = http.local_addr() {
        tracing::info!(%addr, "http listener accepting");
    }

    let connections = std::sync::Arc::clone(&state.connections);
    let app = build_router(state);
    let result = axum::serve(
        http,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
    .await
    .map_err(|e| HubError::Transport(format!("http server failed: {e}")));

    // axum can also return on its own error.
    shutdown.cancel();
    if let Err(err) = presence.await {
        tracing::error!(error = %err, "presence monitor panicked");
    }
    if let Some(task) = line_task
        && let Err(err) = task.await
    {
        tracing::error!(error = %err, "tcp listener panicked");
    }
    let dropped = connections.close_all().await;
    tracing::info!(dropped, "hub stopped");

    result
}
