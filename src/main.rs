//! devhub server entry point.
//!
//! Starts the HTTP/WebSocket listener, the optional TCP listener, and the
//! presence monitor, and shuts everything down on Ctrl-C.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use devhub::app_state::{self, AppState};
use devhub::config::HubConfig;
use devhub::domain::SystemClock;
use devhub::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = HubConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        tcp_addr = ?config.tcp_listen_addr,
        transport = ?config.command_transport,
        "starting devhub"
    );

    // Build application state
    let transport = app_state::command_transport(&config);
    let state = AppState::new(&config, Arc::new(SystemClock), transport);

    // Bind listeners before anything starts running
    let http = server::bind(config.listen_addr).await?;
    let line_listener = match config.tcp_listen_addr {
        Some(addr) => Some(server::bind(addr).await?),
        None => None,
    };

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("shutdown requested");
        shutdown.cancel();
    });

    server::serve(http, line_listener, state).await?;
    Ok(())
}
