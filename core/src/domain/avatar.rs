use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::de;

/// A configurable chatbot identity owned by a business user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Avatar {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Owner-authored system prompt, used when no trained version is active
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
    #[serde(default)]
    pub business_context: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub compliance_rules: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub response_guidelines: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub personality_traits: Vec<String>,
    #[serde(default = "de::default_true", deserialize_with = "de::bool_default_true")]
    pub price_visible: bool,
    /// Selected base or fine-tuned model id
    #[serde(default)]
    pub model_id: Option<String>,
}

impl Avatar {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
            system_prompt: None,
            backstory: None,
            business_context: None,
            company_name: None,
            industry: None,
            compliance_rules: Vec::new(),
            response_guidelines: Vec::new(),
            personality_traits: Vec::new(),
            price_visible: true,
            model_id: None,
        }
    }
}

/// Immutable snapshot of a trained system prompt and its structured metadata.
///
/// At most one version per avatar is active; the engine reads only that one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptVersion {
    pub id: String,
    pub avatar_id: String,
    #[serde(default)]
    pub version_number: i32,
    pub system_prompt: String,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub personality_traits: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub behavior_rules: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub compliance_rules: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub response_guidelines: Vec<String>,
    #[serde(default)]
    pub response_style: Option<Value>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub parent_version_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Channel the conversation arrives on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Web,
    #[serde(alias = "wa")]
    WhatsApp,
    Api,
}

impl Platform {
    /// Whether the channel renders markdown
    pub fn renders_markdown(self) -> bool {
        !matches!(self, Platform::WhatsApp)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Platform::Web),
            "whatsapp" | "wa" => Ok(Platform::WhatsApp),
            "api" => Ok(Platform::Api),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Where and with whom the conversation happens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformContext {
    pub platform: Platform,
    /// Phone number or handle of the person on the other side, if known
    pub contact_handle: Option<String>,
}
