use std::fs;
use std::path::Path;

use avatar_core::domain::{
    Avatar, KnowledgeChunk, Memory, MemoryImage, Product, Promotion, PromptVersion,
};
use avatar_core::InMemoryStore;
use serde::Deserialize;

/// Seed data for the in-memory store, one JSON document
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub avatars: Vec<Avatar>,
    pub prompt_versions: Vec<PromptVersion>,
    pub products: Vec<Product>,
    pub promotions: Vec<Promotion>,
    pub memories: Vec<Memory>,
    pub memory_images: Vec<MemoryImage>,
    pub knowledge: Vec<KnowledgeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeEntry {
    pub avatar_id: String,
    #[serde(flatten)]
    pub chunk: KnowledgeChunk,
}

impl Fixture {
    pub fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn into_store(self) -> avatar_core::Result<InMemoryStore> {
        let store = InMemoryStore::new();
        for avatar in self.avatars {
            store.insert_avatar(avatar);
        }
        for version in self.prompt_versions {
            store.insert_prompt_version(version);
        }
        for product in self.products {
            store.insert_product(product)?;
        }
        for promotion in self.promotions {
            store.insert_promotion(promotion)?;
        }
        for memory in self.memories {
            store.insert_memory(memory);
        }
        for image in self.memory_images {
            store.insert_memory_image(image);
        }
        for entry in self.knowledge {
            store.insert_knowledge(&entry.avatar_id, entry.chunk);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_fixture_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/shop.json");
        let fixture = Fixture::read(&path).unwrap();
        assert_eq!(fixture.avatars.len(), 1);
        assert!(!fixture.products.is_empty());
        fixture.into_store().unwrap();
    }
}
