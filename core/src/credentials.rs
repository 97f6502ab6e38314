use async_trait::async_trait;
use tracing::debug;

use crate::{EngineError, Result};

/// Model provider key; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Where model keys come from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Key assigned to the user by an operator/administrator
    async fn operator_assigned_key(&self, user_id: &str) -> Result<Option<String>>;

    /// Key the user supplied in their own settings
    async fn user_key(&self, user_id: &str) -> Result<Option<String>>;
}

/// Operator-assigned keys take precedence over user-supplied ones.
/// No key at all is a configuration error for the request.
pub async fn resolve_model_credential(
    source: &dyn CredentialSource,
    user_id: &str,
) -> Result<ApiKey> {
    if let Some(key) = non_blank(source.operator_assigned_key(user_id).await?) {
        debug!(target: "credentials", user_id = %user_id, origin = "operator", "Resolved model credential");
        return Ok(ApiKey::new(key));
    }
    if let Some(key) = non_blank(source.user_key(user_id).await?) {
        debug!(target: "credentials", user_id = %user_id, origin = "user", "Resolved model credential");
        return Ok(ApiKey::new(key));
    }
    Err(EngineError::Configuration(
        "no OpenAI API key configured, contact your administrator".to_string(),
    ))
}

fn non_blank(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}
