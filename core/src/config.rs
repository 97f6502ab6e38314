use std::time::Duration;

/// Engine tuning loaded from environment variables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tool-execution rounds allowed before the turn fails closed
    pub max_tool_rounds: usize,
    /// Most recent history messages forwarded to the model
    pub history_turns: usize,
    pub knowledge_top_k: usize,
    pub knowledge_min_similarity: f32,
    /// Estimated tokens the knowledge block may occupy in the system prompt
    pub knowledge_token_budget: usize,
    pub memory_limit: usize,
    /// Default turn deadline when the caller does not supply one
    pub turn_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    pub temperature: f32,
    pub default_model: String,
    /// Execute the tool calls of one round concurrently
    pub parallel_tools: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: env_parse("AVATAR_MAX_TOOL_ROUNDS").unwrap_or(6),
            history_turns: env_parse("AVATAR_HISTORY_TURNS").unwrap_or(30),
            knowledge_top_k: env_parse("AVATAR_KNOWLEDGE_TOP_K").unwrap_or(5),
            knowledge_min_similarity: env_parse("AVATAR_KNOWLEDGE_MIN_SIMILARITY").unwrap_or(0.5),
            knowledge_token_budget: env_parse("AVATAR_KNOWLEDGE_TOKEN_BUDGET").unwrap_or(3000),
            memory_limit: env_parse("AVATAR_MEMORY_LIMIT").unwrap_or(10),
            turn_timeout_ms: env_parse("AVATAR_TURN_TIMEOUT_MS").unwrap_or(18_000),
            tool_timeout_ms: env_parse("AVATAR_TOOL_TIMEOUT_MS").unwrap_or(10_000),
            temperature: env_parse("AVATAR_TEMPERATURE").unwrap_or(0.7),
            default_model: std::env::var("AVATAR_DEFAULT_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            parallel_tools: env_parse("AVATAR_PARALLEL_TOOLS").unwrap_or(true),
        }
    }
}

impl EngineConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}
