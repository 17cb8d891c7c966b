//! botchat - paced multi-persona conversations on a local LLM
//!
//! A Rust backend running a conversation state machine that lets a handful of
//! bot personas talk to each other about a topic, one turn at a time.

mod api;
mod config;
mod llm;
mod persona;
mod runtime;
mod sanitize;
mod state_machine;
mod system_prompt;

use api::{create_router, AppState};
use config::AppConfig;
use llm::{LlmService, LoggingService, OllamaService};
use persona::PersonaCatalog;
use rand::rngs::StdRng;
use rand::SeedableRng;
use runtime::{ConversationOrchestrator, ServiceInferenceClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botchat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env();

    // Persona catalog; a bad catalog aborts startup
    let catalog = PersonaCatalog::load(config.personas_path.as_deref())?;
    tracing::info!(
        personas = catalog.len(),
        source = ?config.personas_path,
        "Persona catalog loaded"
    );

    // Inference backend
    let ollama: Arc<dyn LlmService> = Arc::new(OllamaService::new(&config.ollama)?);
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(ollama));
    tracing::info!(
        url = %config.ollama.base_url,
        model = %llm.model_id(),
        timeout_secs = config.ollama.timeout.as_secs(),
        "Inference backend configured"
    );

    let orchestrator = ConversationOrchestrator::spawn(
        config.conversation.clone(),
        ServiceInferenceClient::new(llm.clone(), config.ollama.timeout),
        StdRng::from_entropy(),
    );

    // Create application state
    let state = AppState::new(orchestrator, catalog, llm);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("botchat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
