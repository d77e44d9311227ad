// Funding Summary - Web Server
// Two-phase upload/finalize API with Axum

use anyhow::{Context, Result};
use funding_summary::api::{router, AppState};
use funding_summary::config::{init_tracing, Config};
use funding_summary::{InMemoryScratchStore, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    match config.funding_window() {
        Some(window) => tracing::info!("Funding window: {}", window),
        None => tracing::info!("No funding window configured; every allocation is kept"),
    }

    let state = AppState::new(
        Pipeline::from_config(&config),
        InMemoryScratchStore::new(config.session_ttl),
        config.output_dir.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    tracing::info!("Listening on http://{}", config.listen_addr);
    tracing::info!("Rendered workbooks go to {}", config.output_dir.display());

    axum::serve(listener, router(state))
        .await
        .context("Failed to start server")?;

    Ok(())
}
