mod autosave;
mod chunker;
mod config;
mod error;
mod export;
mod gemini;
mod models;
mod prompt;
mod routes;
mod storage;
mod studio;

use anyhow::Context;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, Any};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{autosave::Autosave, config::Config, gemini::GeminiClient, routes::AppState, storage::LocalStore, studio::Studio};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let gemini = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_api_base.clone(), config.gemini_model.clone());
    if gemini.is_demo() {
        tracing::warn!("GEMINI_API_KEY not set, running in demo mode");
    } else {
        tracing::info!("Using API key: {}...", config.gemini_api_key.chars().take(6).collect::<String>());
    }

    let store = match &config.state_path {
        Some(path) => LocalStore::open(path).with_context(|| format!("opening state file {}", path.display()))?,
        None => {
            tracing::info!("STATE_PATH not set, history is kept in memory only");
            LocalStore::in_memory()
        }
    };

    let state = AppState {
        studio: Arc::new(Studio::new(Arc::new(gemini), store)),
        autosave: Arc::new(Autosave::new(config.autosave_delay)),
    };

    let app = routes::router(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    );

    let addr = config.bind_address;
    tracing::info!(%addr, model = %config.gemini_model, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async { tokio::signal::ctrl_c().await.ok(); })
        .await?;
    Ok(())
}
