use anyhow::Result;
use tracing_subscriber::EnvFilter;

use profile_photo_studio::{AppConfig, AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    let bind_address = config.bind_address();
    if config.gemini.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set, generation requests will fail");
    }
    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, /generate-auto will fail");
    }
    tracing::info!(
        storage_dir = %config.storage_dir.display(),
        public_base_url = %config.public_base_url,
        debug_routes = config.enable_debug_routes,
        "configuration loaded"
    );

    let state = AppState::from_config(config)?;
    let router = build_router(state);
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address).await?;

    tracing::info!("profile photo server started at http://{bind_address}");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}
