//! Process configuration from the environment

use crate::llm::OllamaConfig;
use crate::state_machine::ConvContext;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;

/// Everything read from the environment at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Catalog file; the built-in catalog is used when unset
    pub personas_path: Option<PathBuf>,
    pub ollama: OllamaConfig,
    pub conversation: ConvContext,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ollama_defaults = OllamaConfig::default();
        let conv_defaults = ConvContext::default();

        Self {
            port: parse_var(&lookup, "BOTCHAT_PORT").unwrap_or(DEFAULT_PORT),
            personas_path: lookup("BOTCHAT_PERSONAS")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            ollama: OllamaConfig {
                base_url: lookup("OLLAMA_URL").unwrap_or(ollama_defaults.base_url),
                model: lookup("OLLAMA_MODEL").unwrap_or(ollama_defaults.model),
                timeout: parse_var(&lookup, "BOTCHAT_INFERENCE_TIMEOUT_SECS")
                    .filter(|secs: &u64| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(ollama_defaults.timeout),
            },
            conversation: ConvContext {
                min_turn_gap: parse_var(&lookup, "BOTCHAT_TURN_GAP_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(conv_defaults.min_turn_gap),
                max_consecutive_failures: parse_var(&lookup, "BOTCHAT_MAX_FAILURES")
                    .filter(|n: &u32| *n > 0)
                    .unwrap_or(conv_defaults.max_consecutive_failures),
                context_window: parse_var(&lookup, "BOTCHAT_CONTEXT_WINDOW")
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(conv_defaults.context_window),
                fact_checker_id: lookup("BOTCHAT_FACT_CHECKER_ID")
                    .unwrap_or(conv_defaults.fact_checker_id),
            },
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
