use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::error::{ToolError, ToolResult};
use crate::catalog::DisplayDirective;
use crate::domain::Avatar;

/// Per-turn facts every tool call is scoped by
#[derive(Debug, Clone, PartialEq)]
pub struct ToolContext {
    /// Catalog owner; the avatar id
    pub chatbot_id: String,
    pub avatar_id: String,
    pub price_visible: bool,
    /// Used for fixed-amount labels when a promotion has no product to borrow one from
    pub currency: String,
    /// Promotion activity is evaluated at this instant
    pub now: DateTime<Utc>,
}

impl ToolContext {
    pub fn for_avatar(avatar: &Avatar, now: DateTime<Utc>) -> Self {
        Self {
            chatbot_id: avatar.id.clone(),
            avatar_id: avatar.id.clone(),
            price_visible: avatar.price_visible,
            currency: "MYR".to_string(),
            now,
        }
    }
}

/// Successful tool result before it is wrapped for the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub data: Value,
    pub directives: Vec<DisplayDirective>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            directives: Vec::new(),
        }
    }

    pub fn with_directives(mut self, directives: Vec<DisplayDirective>) -> Self {
        self.directives = directives;
        self
    }
}

/// What the model receives as the `tool` message body
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub display_directives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl ToolEnvelope {
    pub fn ok(output: ToolOutput) -> Self {
        Self {
            success: true,
            data: output.data,
            display_directives: output.directives.iter().map(DisplayDirective::token).collect(),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            success: false,
            data: Value::Null,
            display_directives: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"failed to encode tool result: {e}"}}"#)
        })
    }
}

/// A function the model may call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name as declared to the model (e.g., "search_products")
    fn name(&self) -> String;

    /// Description the model reads; carries the usage guidance
    fn description(&self) -> String;

    /// JSON Schema for the tool's arguments
    fn parameters(&self) -> Value;

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput>;
}

/// Required non-blank string argument
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> ToolResult<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}'")))
}

/// Optional positive integer argument, clamped to `max`
pub(crate) fn limit_arg(arguments: &Value, key: &str, default: usize, max: usize) -> usize {
    arguments
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .map(|n| n as usize)
        .filter(|n| *n > 0)
        .unwrap_or(default)
        .min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_envelope_carries_kind() {
        let env = ToolEnvelope::failure(&ToolError::NotFound("bogus".into()));
        let v: Value = serde_json::from_str(&env.to_json_string()).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error_kind"], "tool_not_found");
        assert!(v.get("data").is_none());
    }

    #[test]
    fn argument_helpers() {
        let args = json!({"query": "  case ", "limit": "500", "blank": " "});
        assert_eq!(required_str(&args, "query").unwrap(), "case");
        assert!(required_str(&args, "blank").is_err());
        assert_eq!(limit_arg(&args, "limit", 10, 50), 50);
        assert_eq!(limit_arg(&args, "missing", 10, 50), 10);
        assert_eq!(limit_arg(&json!({"limit": 0}), "limit", 10, 50), 10);
    }
}
