mod config;
mod db;
mod errors;
mod generation;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::generation::Orchestrator;
use crate::llm_client::{AgentClient, LlmClient};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{PgRunStore, PgWorkspaceStore};

const AGENT_TIMEOUT: Duration = Duration::from_secs(90);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Slate API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL + migrations
    let db = create_pool(&config.database_url).await?;

    // Generation clients. Missing keys fail individual runs, not startup.
    if config.anthropic_api_key.is_none() {
        warn!("ANTHROPIC_API_KEY is not set; generation calls will fail with a configuration error");
    }
    if config.agent_api_key.is_none() {
        warn!("AGENT_API_KEY is not set; topic idea generation will fail with a configuration error");
    }
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    let agent = AgentClient::new(config.agent_api_key.clone(), AGENT_TIMEOUT);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let orchestrator = Orchestrator::new(
        Arc::new(PgRunStore::new(db.clone(), config.stale_run_minutes)),
        Arc::new(PgWorkspaceStore::new(db)),
        llm,
        agent,
    );

    let state = AppState { orchestrator };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
