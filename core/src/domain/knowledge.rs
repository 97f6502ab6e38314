use serde::{Deserialize, Serialize};

/// A retrieval hit: passage text plus its similarity to the query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeChunk {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    pub similarity: f32,
    /// File or document the passage came from
    #[serde(default)]
    pub source: Option<String>,
}

impl KnowledgeChunk {
    pub fn new(content: impl Into<String>, similarity: f32) -> Self {
        Self {
            id: None,
            content: content.into(),
            similarity,
            source: None,
        }
    }
}
