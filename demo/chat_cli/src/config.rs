use std::fs;
use std::path::{Path, PathBuf};

use avatar_core::llm::LlmClientConfig;
use avatar_core::{EngineConfig, Platform};

/// Where the demo reads avatars, catalog and knowledge from
#[derive(Clone, Debug, PartialEq)]
pub enum Backend {
    /// JSON fixture loaded into the in-memory store
    Fixture(PathBuf),
    /// Hosted Postgres REST interface (SUPABASE_URL / SUPABASE_SERVICE_KEY)
    Postgrest,
}

/// High-level configuration for the chat demo
#[derive(Clone, Debug)]
pub struct ChatCliConfig {
    pub backend: Backend,
    pub avatar_id: String,
    pub user_id: String,
    pub platform: Platform,
    pub contact_handle: Option<String>,
    /// Installed as the operator key for `user_id` when using a fixture
    pub api_key: Option<String>,
    pub engine: EngineConfig,
    pub llm: LlmClientConfig,
}

impl Default for ChatCliConfig {
    fn default() -> Self {
        let backend = match std::env::var("CHAT_BACKEND").as_deref() {
            Ok("postgrest") => Backend::Postgrest,
            _ => Backend::Fixture(
                std::env::var("CHAT_FIXTURE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("demo/chat_cli/fixtures/shop.json")),
            ),
        };
        Self {
            backend,
            avatar_id: std::env::var("CHAT_AVATAR_ID").unwrap_or_else(|_| "av-demo".to_string()),
            user_id: std::env::var("CHAT_USER_ID").unwrap_or_else(|_| "owner-demo".to_string()),
            platform: std::env::var("CHAT_PLATFORM")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_default(),
            contact_handle: std::env::var("CHAT_CONTACT").ok().filter(|s| !s.is_empty()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            engine: EngineConfig::default(),
            llm: LlmClientConfig::default(),
        }
    }
}

impl ChatCliConfig {
    /// Load configuration from a TOML file (path via CHAT_CLI_CONFIG or ./chat_cli.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("CHAT_CLI_CONFIG").unwrap_or_else(|_| "chat_cli.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "chat_cli", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<ChatCliToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "chat_cli", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "chat_cli", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ChatCliToml {
    pub backend: Option<String>,
    pub fixture: Option<PathBuf>,
    pub avatar_id: Option<String>,
    pub user_id: Option<String>,
    pub platform: Option<String>,
    pub contact_handle: Option<String>,
    pub api_key: Option<String>,
    pub engine: Option<EngineToml>,
    pub llm: Option<LlmToml>,
}

impl ChatCliToml {
    fn overlay(self, mut base: ChatCliConfig) -> ChatCliConfig {
        match self.backend.as_deref() {
            Some("postgrest") => base.backend = Backend::Postgrest,
            Some("fixture") | None => {
                if let Some(path) = self.fixture {
                    base.backend = Backend::Fixture(path);
                }
            }
            Some(other) => {
                tracing::warn!(target: "chat_cli", backend = %other, "Unknown backend; keeping default");
            }
        }
        if let Some(x) = self.avatar_id {
            base.avatar_id = x;
        }
        if let Some(x) = self.user_id {
            base.user_id = x;
        }
        if let Some(x) = self.platform {
            match x.parse() {
                Ok(p) => base.platform = p,
                Err(e) => tracing::warn!(target: "chat_cli", error = %e, "Ignoring platform"),
            }
        }
        if let Some(x) = self.contact_handle {
            base.contact_handle = Some(x);
        }
        if let Some(x) = self.api_key {
            base.api_key = Some(x);
        }
        if let Some(e) = self.engine {
            e.apply(&mut base.engine);
        }
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct EngineToml {
    pub max_tool_rounds: Option<usize>,
    pub history_turns: Option<usize>,
    pub knowledge_top_k: Option<usize>,
    pub knowledge_min_similarity: Option<f32>,
    pub knowledge_token_budget: Option<usize>,
    pub turn_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub default_model: Option<String>,
    pub parallel_tools: Option<bool>,
}
impl EngineToml {
    fn apply(self, e: &mut EngineConfig) {
        if let Some(x) = self.max_tool_rounds {
            e.max_tool_rounds = x;
        }
        if let Some(x) = self.history_turns {
            e.history_turns = x;
        }
        if let Some(x) = self.knowledge_top_k {
            e.knowledge_top_k = x;
        }
        if let Some(x) = self.knowledge_min_similarity {
            e.knowledge_min_similarity = x;
        }
        if let Some(x) = self.knowledge_token_budget {
            e.knowledge_token_budget = x;
        }
        if let Some(x) = self.turn_timeout_ms {
            e.turn_timeout_ms = x;
        }
        if let Some(x) = self.tool_timeout_ms {
            e.tool_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            e.temperature = x;
        }
        if let Some(x) = self.default_model.filter(|m| !m.is_empty()) {
            e.default_model = x;
        }
        if let Some(x) = self.parallel_tools {
            e.parallel_tools = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LlmToml {
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}
impl LlmToml {
    fn apply(self, l: &mut LlmClientConfig) {
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
        if let Some(x) = self.max_retries {
            l.max_retries = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overlays_only_given_fields() {
        let t: ChatCliToml = toml::from_str(
            r#"
            avatar_id = "av-7"
            platform = "whatsapp"
            fixture = "shop.json"

            [engine]
            max_tool_rounds = 2
            parallel_tools = false

            [llm]
            max_retries = 0
            "#,
        )
        .unwrap();
        let mut base = ChatCliConfig::default();
        base.user_id = "owner".into();
        let cfg = t.overlay(base);

        assert_eq!(cfg.avatar_id, "av-7");
        assert_eq!(cfg.user_id, "owner");
        assert_eq!(cfg.platform, Platform::WhatsApp);
        assert_eq!(cfg.backend, Backend::Fixture(PathBuf::from("shop.json")));
        assert_eq!(cfg.engine.max_tool_rounds, 2);
        assert!(!cfg.engine.parallel_tools);
        assert_eq!(cfg.llm.max_retries, 0);
    }
}
