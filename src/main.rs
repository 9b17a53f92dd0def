//! relay-server entry point.
//!
//! Starts the Axum HTTP server with the command WebSocket endpoint.

use tracing_subscriber::EnvFilter;

use relay_console::app_state::AppState;
use relay_console::config::ServerConfig;
use relay_console::server::{self, process::Shell};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    let token = match config.token.clone() {
        Some(token) => token,
        None => {
            let token = uuid::Uuid::new_v4().simple().to_string();
            tracing::info!(%token, "RELAY_TOKEN not set, generated a session token");
            token
        }
    };

    let state = AppState::new(
        &token,
        Shell {
            program: config.shell.clone(),
            flag: config.shell_flag.clone(),
        },
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, shell = %config.shell, "relay-server listening");

    axum::serve(listener, server::build_router(state)).await?;

    Ok(())
}
