//! # cmdgw-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the command gateway.
//! Binds to a configurable port (default 8080).

use cmdgw_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let port = config.port;
    let sweep_interval_secs = config.sweep_interval_secs;
    tracing::info!(?config, "starting command gateway");

    let state = AppState::new(config);

    // Background escalation sweep.
    cmdgw_api::sweeper::spawn_escalation_sweeper(state.gateway.clone(), sweep_interval_secs);

    let app = cmdgw_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("command gateway API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
