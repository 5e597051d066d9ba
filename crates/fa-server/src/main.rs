//! Event listener service
//!
//! Usage: `fa-server [config_dir]` (defaults to the current directory).

use anyhow::{Context, Result};
use fa_config::AssistantConfig;
use fa_server::Assistant;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Starting event listener service (config: {:?})", config_dir);

    let config = AssistantConfig::load(&config_dir)
        .with_context(|| format!("loading configuration from {:?}", config_dir))?;
    let assistant = Assistant::build(&config, &config_dir).await?;
    assistant.start().await?;

    let listener = tokio::net::TcpListener::bind(assistant.bind_addr())
        .await
        .with_context(|| format!("binding {}", assistant.bind_addr()))?;
    info!("API server listening on {}", assistant.bind_addr());

    axum::serve(listener, assistant.router())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("Shutting down...");
    assistant.shutdown().await;
    Ok(())
}
