//! Main Entrypoint for the Atoms Token Relay
//!
//! Loads configuration, builds the upstream client and router, then serves
//! until `Ctrl+C`.

use anyhow::Context;
use atoms_relay::{
    config::Config,
    router::create_router,
    state::AppState,
    upstream::{AtomsUpstream, UpstreamClient},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let upstream: Arc<dyn UpstreamClient> = Arc::new(
        AtomsUpstream::new(config.upstream_base_url.clone(), config.upstream_timeout)
            .context("Failed to build upstream client")?,
    );

    let app_state = Arc::new(AppState { upstream });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    info!(
        upstream = %config.upstream_base_url,
        bind_address = %config.bind_address,
        "Relay configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
