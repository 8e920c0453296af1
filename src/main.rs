mod auth;
mod config;
mod docs;
mod error;
mod gateway;
mod llm;
mod pipeline;
mod prompt;
mod retrieve;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Settings;
use docs::WeaviateStore;
use llm::OllamaClient;
use pipeline::RagEngine;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    // Init store client
    let store = Arc::new(WeaviateStore::new(&settings.store)?);
    info!(url = %settings.store.base_url, class = %settings.store.class, "Semantic store client initialized");

    // Init generator client
    let generator = Arc::new(OllamaClient::new(&settings.generator, settings.limits.generation_timeout)?);
    info!(url = %settings.generator.base_url, model = %settings.generator.model, "Generator client initialized");

    let engine = Arc::new(RagEngine::new(
        settings.credential.clone(),
        store,
        generator,
        settings.rag,
        settings.limits,
    ));
    info!(
        top_k = settings.rag.default_top_k,
        max_top_k = settings.rag.max_top_k,
        max_snippet_chars = settings.rag.max_snippet_chars,
        permits = settings.limits.max_concurrent_generations,
        "Orchestrator ready"
    );

    let state = AppState::new(engine, settings.credential.clone());
    gateway::serve(settings.bind_addr, state).await
}
