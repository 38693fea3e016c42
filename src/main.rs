use anyhow::{Context, Result};
use tracing::info;
use wris_backend::api::{router, AppState};
use wris_backend::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting water data API server...");

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!("Upstream API: {}", config.base_url);

    // One upstream client for the whole process
    let state = AppState::from_config(&config).context("Failed to build upstream client")?;

    let app = router(state);

    info!("Server running on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
