mod config;
mod errors;
mod models;
mod provider;
mod routes;
mod service;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::AppConfig;
use crate::provider::DeepSeekProvider;
use crate::routes::app_router;
use crate::service::chat_service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepseek_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration (copy .env.example to .env)")?;

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let provider = DeepSeekProvider::new(&config.base_url, &config.api_key)
        .context("failed to build the DeepSeek client")?;
    let chat_service =
        ChatService::new(Arc::new(provider), config.default_model.clone(), config.max_duration);

    info!(
        "Completion provider at {} (default model {}, max duration {}s)",
        config.base_url,
        config.default_model,
        config.max_duration.as_secs()
    );

    // ── Router ────────────────────────────────────────────────────────────────
    let app = app_router(chat_service, &config)?;

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
