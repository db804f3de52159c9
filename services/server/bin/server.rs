//! Main Entrypoint for the Companion Server
//!
//! This binary is responsible for:
//! 1. Loading configuration from the settings file and environment.
//! 2. Initializing logging.
//! 3. Initializing shared services (the generator and the session registry).
//! 4. Binding the listener and serving until Ctrl+C.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use companion_core::{
    llm_client::{Generator, OpenAICompatibleGenerator},
    tool::{LoggingToolHooks, ToolHooks},
};
use companion_server::{
    config::Config, registry::SessionRegistry, server::serve, state::AppState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `shutdown` when the `Ctrl+C` signal arrives.
async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base());
    let generator: Arc<dyn Generator> = Arc::new(OpenAICompatibleGenerator::new(
        openai_config,
        config.model_name.clone(),
    ));
    let tool_hooks: Option<Arc<dyn ToolHooks>> = config
        .tools_enabled
        .then(|| Arc::new(LoggingToolHooks) as Arc<dyn ToolHooks>);

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        registry: Arc::new(SessionRegistry::with_parked_capacity(
            config.max_parked_sessions,
        )),
        generator,
        tool_hooks,
    });

    // --- 4. Start Server ---
    info!(
        model = %config.model_name,
        base_url = %config.base_url,
        bind_address = %config.bind_address,
        characters = %config.characters_path.display(),
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    serve(listener, app_state, shutdown).await?;

    info!("Server has shut down.");
    Ok(())
}
