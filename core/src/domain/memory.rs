use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recollection attached to an avatar; images are fetched separately
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: String,
    pub avatar_id: String,
    pub title: String,
    #[serde(default)]
    pub memory_date: Option<NaiveDate>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub is_private: bool,
}

impl Memory {
    /// Summary collapsed onto one line
    pub fn one_line_summary(&self) -> String {
        self.summary.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryImage {
    pub id: String,
    pub memory_id: String,
    #[serde(alias = "image_url")]
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
}
