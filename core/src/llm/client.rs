use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::parse::{parse_model_turn, provider_error_message};
use super::types::{CompletionRequest, ModelTurn, ToolChoice};
use super::LanguageModel;
use crate::{EngineError, Result};

/// Configuration for OpenAiClient loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String, // e.g., https://api.openai.com/v1
    pub request_timeout_ms: u64,
    /// Extra attempts after the first on 429/5xx/transport errors
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            request_timeout_ms: std::env::var("LLM_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
            max_retries: std::env::var("LLM_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(2),
            retry_base_delay_ms: std::env::var("LLM_RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(500),
        }
    }
}

/// Chat Completions client for OpenAI-compatible backends.
///
/// The API key travels with each request, so one client serves every tenant.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    cfg: LlmClientConfig,
}

impl OpenAiClient {
    pub fn new(cfg: LlmClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| EngineError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmClientConfig::default())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.cfg
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let use_tools = !request.tools.is_empty() && request.tool_choice != ToolChoice::None;
        if use_tools {
            body["tools"] = Value::Array(request.tools.iter().map(|t| t.to_openai()).collect());
            body["tool_choice"] = match request.tool_choice {
                ToolChoice::Required => json!("required"),
                _ => json!("auto"),
            };
        }
        body
    }

    async fn post_once(&self, url: &str, body: &Value, request: &CompletionRequest) -> Result<ModelTurn> {
        let resp = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .bearer_auth(request.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::UpstreamModel {
                status: None,
                message: format!("Chat Completions request failed: {e}"),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::UpstreamModel {
                status: Some(status.as_u16()),
                message: provider_error_message(&text),
            });
        }

        let val: Value = resp.json().await.map_err(|e| EngineError::UpstreamModel {
            status: None,
            message: format!("Failed to parse Chat Completions JSON: {e}"),
        })?;
        parse_model_turn(&val)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    /// Contract:
    /// - Input: messages, tool declarations, per-request key
    /// - Output: assistant text and/or tool calls
    /// - Error: `UpstreamModel`; 429/5xx/transport errors are retried with exponential backoff
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = Self::build_body(request);
        debug!(
            target: "llm_client",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "POST {} via Chat Completions", url
        );

        let mut attempt: u32 = 0;
        loop {
            match self.post_once(&url, &body, request).await {
                Ok(turn) => return Ok(turn),
                Err(e) if e.is_retryable() && attempt < self.cfg.max_retries => {
                    let delay = self.cfg.retry_base_delay_ms.saturating_mul(1u64 << attempt.min(10));
                    warn!(target: "llm_client", error = %e, attempt = attempt + 1, delay_ms = delay, "Transient model error; retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(target: "llm_client", error = %e, attempts = attempt + 1, "Chat Completions error");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ApiKey;
    use crate::llm::{ChatMessage, ToolSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const OK_BODY: &str = r#"{"model":"gpt-4o-mini","choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;

    /// Answers each connection with the next scripted status (the last one repeats)
    async fn stub_server(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];
                read_request(&mut socket).await;
                let body = if status == 200 {
                    OK_BODY.to_string()
                } else {
                    format!(r#"{{"error":{{"message":"status {status}"}}}}"#)
                };
                let resp = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(resp.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/v1"), hits)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(n) = socket.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn client(base_url: String, max_retries: u32) -> OpenAiClient {
        OpenAiClient::new(LlmClientConfig {
            base_url,
            request_timeout_ms: 2_000,
            max_retries,
            retry_base_delay_ms: 1,
        })
        .unwrap()
    }

    fn request(tool_choice: ToolChoice) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::system("s"), ChatMessage::user("hi")],
            tools: vec![ToolSpec {
                name: "list_product_categories".into(),
                description: "d".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
            tool_choice,
            max_tokens: 4096,
            temperature: 0.7,
            api_key: ApiKey::new("sk-test"),
        }
    }

    #[test]
    fn body_exposes_tools_with_auto_choice() {
        let body = OpenAiClient::build_body(&request(ToolChoice::Auto));
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "list_product_categories");
        assert_eq!(body["max_tokens"], 4096);
        assert!(!body.to_string().contains("sk-test"));
    }

    #[test]
    fn body_hides_tools_when_choice_is_none() {
        let body = OpenAiClient::build_body(&request(ToolChoice::None));
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let (url, hits) = stub_server(vec![503, 429, 200]).await;
        let turn = client(url, 2)
            .complete(&request(ToolChoice::Auto))
            .await
            .unwrap();
        assert_eq!(turn.content.as_deref(), Some("hello"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_after_max_retries() {
        let (url, hits) = stub_server(vec![503]).await;
        let err = client(url, 2)
            .complete(&request(ToolChoice::Auto))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UpstreamModel { status: Some(503), .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = stub_server(vec![400, 200]).await;
        let err = client(url, 2)
            .complete(&request(ToolChoice::Auto))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UpstreamModel { status: Some(400), .. }));
        assert!(err.to_string().contains("status 400"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
