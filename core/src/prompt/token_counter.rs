//! Token Counting
//!
//! Character-based estimates used to keep the knowledge block inside its budget.

use std::sync::Arc;

pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str) -> usize;
}

/// Estimates tokens from character count plus a 10% margin for special tokens
#[derive(Debug, Clone)]
pub struct CharEstimateCounter {
    chars_per_token: f32,
}

impl CharEstimateCounter {
    pub fn new(chars_per_token: f32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1.0),
        }
    }
}

impl Default for CharEstimateCounter {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenCounter for CharEstimateCounter {
    fn count_text(&self, text: &str) -> usize {
        // chars, not bytes: CJK text would otherwise be over-counted threefold
        let base = (text.chars().count() as f32 / self.chars_per_token).ceil() as usize;
        base + base / 10
    }
}

pub fn counter_for_model(model: &str) -> Arc<dyn TokenCounter> {
    let base = model.strip_prefix("ft:").unwrap_or(model);
    if base.contains("gpt-4") || base.starts_with("o1") || base.starts_with("o3") {
        Arc::new(CharEstimateCounter::new(4.0))
    } else {
        Arc::new(CharEstimateCounter::new(3.5))
    }
}
