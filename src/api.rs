//! HTTP API for botchat

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::LlmService;
use crate::persona::PersonaCatalog;
use crate::runtime::ConversationOrchestrator;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub catalog: Arc<PersonaCatalog>,
    /// Backs the chat proxy endpoint
    pub llm: Arc<dyn LlmService>,
}

impl AppState {
    pub fn new(
        orchestrator: ConversationOrchestrator,
        catalog: PersonaCatalog,
        llm: Arc<dyn LlmService>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            catalog: Arc::new(catalog),
            llm,
        }
    }
}
