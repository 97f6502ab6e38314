//! Pre-model retrieval of knowledge passages and memories.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{KnowledgeChunk, Memory};
use crate::store::{KnowledgeSource, MemorySource};

/// What retrieval produced for one turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    /// Descending similarity, at most top-K, all at or above the threshold
    pub chunks: Vec<KnowledgeChunk>,
    /// Non-private only
    pub memories: Vec<Memory>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalLimits {
    pub top_k: usize,
    pub min_similarity: f32,
    pub memory_limit: usize,
}

#[derive(Clone)]
pub struct KnowledgeRetriever {
    knowledge: Arc<dyn KnowledgeSource>,
    memories: Arc<dyn MemorySource>,
}

impl KnowledgeRetriever {
    pub fn new(knowledge: Arc<dyn KnowledgeSource>, memories: Arc<dyn MemorySource>) -> Self {
        Self {
            knowledge,
            memories,
        }
    }

    /// Fetch knowledge and memories concurrently.
    ///
    /// Either read failing degrades to an empty result; the turn still runs.
    pub async fn retrieve(&self, avatar_id: &str, query: &str, limits: RetrievalLimits) -> Retrieved {
        let knowledge = async {
            if query.trim().is_empty() || limits.top_k == 0 {
                return Ok(Vec::new());
            }
            self.knowledge
                .search_knowledge(avatar_id, query, limits.top_k, limits.min_similarity)
                .await
        };
        let memories = async {
            if limits.memory_limit == 0 {
                return Ok(Vec::new());
            }
            self.memories
                .get_recent_memories(avatar_id, limits.memory_limit)
                .await
        };
        let (knowledge, memories) = tokio::join!(knowledge, memories);

        let chunks = match knowledge {
            Ok(chunks) => select_chunks(chunks, limits.top_k, limits.min_similarity),
            Err(e) => {
                warn!(target: "knowledge", avatar_id = %avatar_id, error = %e, kind = e.kind(), "Knowledge search failed; continuing without it");
                Vec::new()
            }
        };
        let memories = match memories {
            Ok(memories) => memories
                .into_iter()
                .filter(|m| !m.is_private)
                .take(limits.memory_limit)
                .collect(),
            Err(e) => {
                warn!(target: "knowledge", avatar_id = %avatar_id, error = %e, kind = e.kind(), "Memory read failed; continuing without it");
                Vec::new()
            }
        };

        debug!(target: "knowledge", avatar_id = %avatar_id, chunks = chunks.len(), memories = memories.len(), "Retrieved context");
        Retrieved { chunks, memories }
    }
}

/// Threshold, then stable descending sort, then top-K.
///
/// Sources are external, so their own filtering is not trusted.
pub fn select_chunks(
    chunks: Vec<KnowledgeChunk>,
    top_k: usize,
    min_similarity: f32,
) -> Vec<KnowledgeChunk> {
    let mut kept: Vec<KnowledgeChunk> = chunks
        .into_iter()
        .filter(|c| c.similarity >= min_similarity && !c.content.trim().is_empty())
        .collect();
    kept.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    kept.truncate(top_k);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_chunks_filters_sorts_and_caps() {
        let chunks = vec![
            KnowledgeChunk::new("low", 0.4),
            KnowledgeChunk::new("mid", 0.7),
            KnowledgeChunk::new("top", 0.9),
            KnowledgeChunk::new("mid-2", 0.7),
            KnowledgeChunk::new("  ", 0.95),
        ];
        let kept = select_chunks(chunks, 2, 0.5);
        let texts: Vec<&str> = kept.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["top", "mid"]);
    }
}
