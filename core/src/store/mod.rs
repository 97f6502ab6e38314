//! Read interfaces onto the datastore.
//!
//! The engine never talks to tables directly; every query goes through one of
//! these traits. `InMemoryStore` backs tests and the demo, `PostgrestStore`
//! talks to the hosted Postgres REST interface.

pub mod memory;
pub mod postgrest;

pub use memory::InMemoryStore;
pub use postgrest::{PostgrestConfig, PostgrestStore};

use async_trait::async_trait;

use crate::domain::{Avatar, KnowledgeChunk, Memory, MemoryImage, Product, Promotion, PromptVersion};
use crate::Result;

#[async_trait]
pub trait AvatarStore: Send + Sync {
    async fn get_avatar(&self, avatar_id: &str) -> Result<Option<Avatar>>;

    /// The single active prompt version, if the avatar has one
    async fn get_active_prompt_version(&self, avatar_id: &str) -> Result<Option<PromptVersion>>;
}

/// Similarity search over the avatar's uploaded knowledge
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn search_knowledge(
        &self,
        avatar_id: &str,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<KnowledgeChunk>>;
}

#[async_trait]
pub trait MemorySource: Send + Sync {
    /// Most recent non-private memories, newest first
    async fn get_recent_memories(&self, avatar_id: &str, limit: usize) -> Result<Vec<Memory>>;

    async fn get_memory(&self, memory_id: &str) -> Result<Option<Memory>>;

    async fn get_memory_images(&self, memory_id: &str) -> Result<Vec<MemoryImage>>;
}

/// Product and promotion queries scoped to one chatbot
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, chatbot_id: &str, include_out_of_stock: bool)
        -> Result<Vec<Product>>;

    /// Case-insensitive substring match over name, category, SKU and description
    async fn search_products(&self, chatbot_id: &str, query: &str, limit: usize)
        -> Result<Vec<Product>>;

    async fn get_product(&self, chatbot_id: &str, product_id: &str) -> Result<Option<Product>>;

    /// Raw category values; callers dedupe
    async fn list_categories(&self, chatbot_id: &str) -> Result<Vec<String>>;

    async fn products_by_category(
        &self,
        chatbot_id: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<Product>>;

    /// Promotions flagged active; window and usage checks happen in the accessor
    async fn list_promotions(&self, chatbot_id: &str) -> Result<Vec<Promotion>>;

    /// Case-insensitive code lookup, regardless of activity
    async fn find_promotion_by_code(&self, chatbot_id: &str, code: &str)
        -> Result<Option<Promotion>>;
}
