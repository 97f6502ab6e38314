use serde_json::Value;

use super::types::{FunctionCall, ModelTurn, NormalizedToolCall, TokenUsage, ToolCall};
use crate::{EngineError, Result};

/// Decode `choices[0].message` of a chat-completions response
pub fn parse_model_turn(v: &Value) -> Result<ModelTurn> {
    let message = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| EngineError::UpstreamModel {
            status: None,
            message: "Missing choices[0].message in chat completions".into(),
        })?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string());

    let mut tool_calls = Vec::new();
    if let Some(arr) = message.get("tool_calls").and_then(|x| x.as_array()) {
        for (i, tc) in arr.iter().enumerate() {
            let Some(func) = tc.get("function") else {
                continue;
            };
            let name = func
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string();
            if name.is_empty() {
                continue;
            }
            let arguments = match func.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "{}".to_string(),
                Some(other) => other.to_string(),
            };
            let id = tc
                .get("id")
                .and_then(|x| x.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("call_{i}"));
            tool_calls.push(ToolCall {
                id,
                kind: "function".to_string(),
                function: FunctionCall { name, arguments },
            });
        }
    }

    let usage = v
        .get("usage")
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());

    Ok(ModelTurn {
        content,
        tool_calls,
        usage,
        model: v
            .get("model")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
    })
}

// Parsing helpers (public for testing)
pub fn parse_tool_calls_from_chat(v: &Value) -> Vec<NormalizedToolCall> {
    parse_model_turn(v)
        .map(|turn| turn.tool_calls.iter().map(ToolCall::normalized).collect())
        .unwrap_or_default()
}

/// Provider error message from a non-success body, falling back to the raw text
pub(crate) fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                crate::preview(trimmed, 300)
            }
        })
}
