//! LLM module: chat message types, the `LanguageModel` capability and its HTTP client
//!
//! This module provides:
//! - `ChatMessage`, `ToolCall`, `CompletionRequest`, `ModelTurn` for the chat-completions shape
//! - `LanguageModel`, the seam the orchestrator calls (mocked in tests)
//! - `OpenAiClient`, an OpenAI-compatible implementation with bounded retry
//! - `max_output_tokens_for`, the per-model-family output budget table

mod budget;
mod client;
mod parse;
mod types;

pub use budget::max_output_tokens_for;
pub use client::{LlmClientConfig, OpenAiClient};
pub use parse::{parse_model_turn, parse_tool_calls_from_chat};
pub use types::{
    ChatMessage, CompletionRequest, FunctionCall, ModelTurn, NormalizedToolCall, Role, TokenUsage,
    ToolCall, ToolChoice, ToolSpec,
};

use async_trait::async_trait;

use crate::Result;

/// A chat model that may answer with text or with tool calls
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn>;
}
