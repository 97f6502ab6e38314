//! DashMap-backed store used by tests and the demo binary

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{AvatarStore, CatalogStore, KnowledgeSource, MemorySource};
use crate::credentials::CredentialSource;
use crate::domain::{
    Avatar, KnowledgeChunk, Memory, MemoryImage, Product, Promotion, PromptVersion,
};
use crate::usage::{UsageRecord, UsageSink};
use crate::{EngineError, Result};

#[derive(Default)]
pub struct InMemoryStore {
    avatars: DashMap<String, Avatar>,
    prompt_versions: DashMap<String, Vec<PromptVersion>>,
    products: DashMap<String, Vec<Product>>,
    promotions: DashMap<String, Vec<Promotion>>,
    memories: DashMap<String, Vec<Memory>>,
    memory_images: DashMap<String, Vec<MemoryImage>>,
    knowledge: DashMap<String, Vec<KnowledgeChunk>>,
    operator_keys: DashMap<String, String>,
    user_keys: DashMap<String, String>,
    usage: Mutex<Vec<UsageRecord>>,
    prompt_version_uses: DashMap<String, u64>,
}

fn invalid(kind: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Store(format!("invalid {kind}: {err}"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_avatar(&self, avatar: Avatar) {
        self.avatars.insert(avatar.id.clone(), avatar);
    }

    /// Insert a version; an active one deactivates its siblings first
    pub fn insert_prompt_version(&self, version: PromptVersion) {
        let mut versions = self
            .prompt_versions
            .entry(version.avatar_id.clone())
            .or_default();
        if version.is_active {
            for v in versions.iter_mut() {
                v.is_active = false;
            }
        }
        versions.push(version);
    }

    pub fn activate_prompt_version(&self, avatar_id: &str, version_id: &str) -> Result<()> {
        let mut versions = self
            .prompt_versions
            .get_mut(avatar_id)
            .ok_or_else(|| EngineError::Store(format!("no prompt versions for {avatar_id}")))?;
        if !versions.iter().any(|v| v.id == version_id) {
            return Err(EngineError::Store(format!("unknown prompt version {version_id}")));
        }
        for v in versions.iter_mut() {
            v.is_active = v.id == version_id;
        }
        Ok(())
    }

    /// Insert a product; SKUs are unique per chatbot
    pub fn insert_product(&self, product: Product) -> Result<()> {
        product.validate().map_err(|e| invalid("product", e))?;
        let mut products = self.products.entry(product.chatbot_id.clone()).or_default();
        if products
            .iter()
            .any(|p| p.sku.eq_ignore_ascii_case(&product.sku) && p.id != product.id)
        {
            return Err(EngineError::Store(format!(
                "duplicate sku {} for chatbot {}",
                product.sku, product.chatbot_id
            )));
        }
        products.retain(|p| p.id != product.id);
        products.push(product);
        Ok(())
    }

    pub fn insert_promotion(&self, promotion: Promotion) -> Result<()> {
        promotion.validate().map_err(|e| invalid("promotion", e))?;
        let mut promotions = self
            .promotions
            .entry(promotion.chatbot_id.clone())
            .or_default();
        promotions.retain(|p| p.id != promotion.id);
        promotions.push(promotion);
        Ok(())
    }

    pub fn insert_memory(&self, memory: Memory) {
        self.memories
            .entry(memory.avatar_id.clone())
            .or_default()
            .push(memory);
    }

    pub fn insert_memory_image(&self, image: MemoryImage) {
        self.memory_images
            .entry(image.memory_id.clone())
            .or_default()
            .push(image);
    }

    pub fn insert_knowledge(&self, avatar_id: &str, chunk: KnowledgeChunk) {
        self.knowledge
            .entry(avatar_id.to_string())
            .or_default()
            .push(chunk);
    }

    pub fn set_operator_key(&self, user_id: &str, key: &str) {
        self.operator_keys.insert(user_id.to_string(), key.to_string());
    }

    pub fn set_user_key(&self, user_id: &str, key: &str) {
        self.user_keys.insert(user_id.to_string(), key.to_string());
    }

    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn prompt_version_uses(&self, version_id: &str) -> u64 {
        self.prompt_version_uses
            .get(version_id)
            .map(|v| *v)
            .unwrap_or(0)
    }

    fn products_of(&self, chatbot_id: &str) -> Vec<Product> {
        let mut products = self
            .products
            .get(chatbot_id)
            .map(|p| p.clone())
            .unwrap_or_default();
        products.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        products
    }
}

/// Share of distinct query terms that occur in the passage
fn lexical_similarity(query: &str, passage: &str) -> f32 {
    let terms: HashSet<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let passage = passage.to_lowercase();
    let hits = terms.iter().filter(|t| passage.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}

#[async_trait]
impl AvatarStore for InMemoryStore {
    async fn get_avatar(&self, avatar_id: &str) -> Result<Option<Avatar>> {
        Ok(self.avatars.get(avatar_id).map(|a| a.clone()))
    }

    async fn get_active_prompt_version(&self, avatar_id: &str) -> Result<Option<PromptVersion>> {
        Ok(self
            .prompt_versions
            .get(avatar_id)
            .and_then(|versions| versions.iter().find(|v| v.is_active).cloned()))
    }
}

#[async_trait]
impl KnowledgeSource for InMemoryStore {
    async fn search_knowledge(
        &self,
        avatar_id: &str,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<KnowledgeChunk>> {
        let Some(chunks) = self.knowledge.get(avatar_id) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<KnowledgeChunk> = chunks
            .iter()
            .map(|c| {
                let mut hit = c.clone();
                hit.similarity = lexical_similarity(query, &c.content);
                hit
            })
            .filter(|c| c.similarity >= min_similarity)
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        debug!(target: "knowledge", avatar_id = %avatar_id, hits = hits.len(), "In-memory knowledge search");
        Ok(hits)
    }
}

#[async_trait]
impl MemorySource for InMemoryStore {
    async fn get_recent_memories(&self, avatar_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let mut memories: Vec<Memory> = self
            .memories
            .get(avatar_id)
            .map(|m| m.iter().filter(|m| !m.is_private).cloned().collect())
            .unwrap_or_default();
        memories.sort_by(|a, b| b.memory_date.cmp(&a.memory_date));
        memories.truncate(limit);
        Ok(memories)
    }

    async fn get_memory(&self, memory_id: &str) -> Result<Option<Memory>> {
        Ok(self
            .memories
            .iter()
            .find_map(|entry| entry.value().iter().find(|m| m.id == memory_id).cloned()))
    }

    async fn get_memory_images(&self, memory_id: &str) -> Result<Vec<MemoryImage>> {
        Ok(self
            .memory_images
            .get(memory_id)
            .map(|i| i.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn list_products(
        &self,
        chatbot_id: &str,
        include_out_of_stock: bool,
    ) -> Result<Vec<Product>> {
        Ok(self
            .products_of(chatbot_id)
            .into_iter()
            .filter(|p| include_out_of_stock || p.in_stock)
            .collect())
    }

    async fn search_products(
        &self,
        chatbot_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .products_of(chatbot_id)
            .into_iter()
            .filter(|p| {
                [
                    Some(p.name.as_str()),
                    p.category.as_deref(),
                    Some(p.sku.as_str()),
                    p.description.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            })
            .take(limit)
            .collect())
    }

    async fn get_product(&self, chatbot_id: &str, product_id: &str) -> Result<Option<Product>> {
        Ok(self
            .products
            .get(chatbot_id)
            .and_then(|p| p.iter().find(|p| p.id == product_id).cloned()))
    }

    async fn list_categories(&self, chatbot_id: &str) -> Result<Vec<String>> {
        Ok(self
            .products_of(chatbot_id)
            .into_iter()
            .filter_map(|p| p.category)
            .collect())
    }

    async fn products_by_category(
        &self,
        chatbot_id: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        Ok(self
            .products_of(chatbot_id)
            .into_iter()
            .filter(|p| {
                p.category_name()
                    .is_some_and(|c| c.eq_ignore_ascii_case(category))
            })
            .take(limit)
            .collect())
    }

    async fn list_promotions(&self, chatbot_id: &str) -> Result<Vec<Promotion>> {
        Ok(self
            .promotions
            .get(chatbot_id)
            .map(|p| p.iter().filter(|p| p.is_active).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_promotion_by_code(
        &self,
        chatbot_id: &str,
        code: &str,
    ) -> Result<Option<Promotion>> {
        Ok(self.promotions.get(chatbot_id).and_then(|p| {
            p.iter()
                .find(|p| {
                    p.promo_code
                        .as_deref()
                        .is_some_and(|c| c.trim().eq_ignore_ascii_case(code.trim()))
                })
                .cloned()
        }))
    }
}

#[async_trait]
impl CredentialSource for InMemoryStore {
    async fn operator_assigned_key(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.operator_keys.get(user_id).map(|k| k.clone()))
    }

    async fn user_key(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.user_keys.get(user_id).map(|k| k.clone()))
    }
}

#[async_trait]
impl UsageSink for InMemoryStore {
    async fn record_model_usage(&self, record: UsageRecord) -> Result<()> {
        self.usage
            .lock()
            .map_err(|_| EngineError::Store("usage log lock poisoned".into()))?
            .push(record);
        Ok(())
    }

    async fn record_prompt_version_usage(&self, version_id: &str) -> Result<()> {
        *self
            .prompt_version_uses
            .entry(version_id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}
