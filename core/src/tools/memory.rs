use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::error::ToolResult;
use super::traits::{required_str, Tool, ToolContext, ToolOutput};
use crate::catalog::DisplayDirective;
use crate::store::MemorySource;

/// Images attached to one of the avatar's memories, as display directives
pub struct GetMemoryImagesTool {
    memories: Arc<dyn MemorySource>,
}

impl GetMemoryImagesTool {
    pub fn new(memories: Arc<dyn MemorySource>) -> Self {
        Self { memories }
    }
}

#[async_trait]
impl Tool for GetMemoryImagesTool {
    fn name(&self) -> String {
        "get_memory_images".to_string()
    }

    fn description(&self) -> String {
        "Fetch the photos attached to one of your memories, using the memory id from the MEMORIES \
list. Call this whenever the user wants to see pictures of a memory."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memory_id": { "type": "string", "description": "Memory id from the MEMORIES list" }
            },
            "required": ["memory_id"]
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let memory_id = required_str(&arguments, "memory_id")?;
        // private memories and other avatars' memories look the same as missing ones
        let memory = self
            .memories
            .get_memory(memory_id)
            .await?
            .filter(|m| m.avatar_id == ctx.avatar_id && !m.is_private);
        let Some(memory) = memory else {
            return Ok(ToolOutput::new(json!({
                "found": false,
                "memory_id": memory_id,
            })));
        };

        let images = self.memories.get_memory_images(&memory.id).await?;
        let directives: Vec<DisplayDirective> = images
            .iter()
            .filter(|img| !img.url.trim().is_empty())
            .enumerate()
            .map(|(i, img)| {
                let label = img
                    .caption
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} ({})", memory.title.trim(), i + 1));
                DisplayDirective::new(img.url.as_str(), label)
            })
            .collect();
        debug!(target: "knowledge", memory_id = %memory.id, images = directives.len(), "get_memory_images");

        let items: Vec<Value> = directives
            .iter()
            .map(|d| json!({ "caption": d.label, "image": d.token() }))
            .collect();
        Ok(ToolOutput::new(json!({
            "found": true,
            "memory_id": memory.id,
            "title": memory.title,
            "count": items.len(),
            "images": items,
        }))
        .with_directives(directives))
    }
}
