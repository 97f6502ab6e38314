use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::TokenUsage;
use crate::Result;

/// Token usage of one turn, reported for billing and analytics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageRecord {
    pub avatar_id: String,
    pub user_id: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(avatar_id: &str, user_id: &str, model: &str, usage: TokenUsage) -> Self {
        Self {
            avatar_id: avatar_id.to_string(),
            user_id: user_id.to_string(),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record_model_usage(&self, record: UsageRecord) -> Result<()>;

    /// Count one use of a prompt version for the training lineage
    async fn record_prompt_version_usage(&self, version_id: &str) -> Result<()>;
}

/// Fine-tuned model ids carry the `ft:` prefix
pub fn is_fine_tuned(model: &str) -> bool {
    model.starts_with("ft:")
}

/// Report usage in the background; failures are logged and dropped
pub fn spawn_model_usage(sink: Arc<dyn UsageSink>, record: UsageRecord) {
    tokio::spawn(async move {
        let model = record.model.clone();
        match sink.record_model_usage(record).await {
            Ok(()) => debug!(target: "usage", model = %model, "Recorded model usage"),
            Err(e) => {
                warn!(target: "usage", model = %model, error = %e, kind = e.kind(), "Failed to record model usage")
            }
        }
    });
}

pub fn spawn_prompt_version_usage(sink: Arc<dyn UsageSink>, version_id: String) {
    tokio::spawn(async move {
        if let Err(e) = sink.record_prompt_version_usage(&version_id).await {
            warn!(target: "usage", version_id = %version_id, error = %e, "Failed to record prompt version usage");
        }
    });
}
