// Avatar Core Library
// Chatbot response engine: prompt composition, catalog tools, tool-calling loop

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod knowledge;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod tools;
pub mod usage;

// Export core types
pub use catalog::{CatalogAccessor, DisplayDirective};
pub use config::EngineConfig;
pub use domain::{Avatar, Memory, Platform, Product, Promotion, PromptVersion};
pub use llm::{LanguageModel, OpenAiClient};
pub use orchestrator::{ChatEngine, ChatReply, ReplyMetadata, RespondContext};
pub use prompt::PromptComposer;
pub use store::InMemoryStore;
pub use tools::ToolRegistry;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model provider error (status {status:?}): {message}")]
    UpstreamModel {
        status: Option<u16>,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable short name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "configuration",
            EngineError::UpstreamModel { .. } => "upstream_model",
            EngineError::Store(_) => "store",
            EngineError::Serialization(_) => "serialization",
        }
    }

    /// Errors the calling adapter should report as a 4xx-equivalent
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }

    /// Transient provider failures worth another attempt (429, 5xx, transport)
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::UpstreamModel { status: None, .. } => true,
            EngineError::UpstreamModel {
                status: Some(code), ..
            } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Char-boundary safe preview used in log fields
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let e = |status| EngineError::UpstreamModel {
            status,
            message: "x".into(),
        };
        assert!(e(Some(429)).is_retryable());
        assert!(e(Some(503)).is_retryable());
        assert!(e(None).is_retryable());
        assert!(!e(Some(400)).is_retryable());
        assert!(!EngineError::Configuration("no key".into()).is_retryable());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 5), "héllo…");
        assert_eq!(preview("short", 80), "short");
    }
}
