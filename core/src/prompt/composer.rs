//! Prompt Composer
//!
//! Builds the system prompt for one turn as a pure function of its inputs.
//! Block order is fixed:
//! 1. base text (active prompt version, or the avatar profile)
//! 2. `KNOWLEDGE BASE` block, truncated chunk by chunk to the token budget
//! 3. `MEMORIES` block
//! 4. tool and image-directive guidance
//! 5. pricing policy, whenever the avatar hides prices
//! 6. platform context

use std::sync::Arc;

use super::token_counter::{CharEstimateCounter, TokenCounter};
use crate::domain::{Avatar, KnowledgeChunk, Memory, Platform, PlatformContext, PromptVersion};

const KNOWLEDGE_OPEN: &str = "=== KNOWLEDGE BASE ===";
const KNOWLEDGE_CLOSE: &str = "=== END KNOWLEDGE BASE ===";
const CHUNK_SEPARATOR: &str = "\n---\n";
const MEMORIES_OPEN: &str = "=== MEMORIES ===";
const MEMORIES_CLOSE: &str = "=== END MEMORIES ===";
const PRICING_OPEN: &str = "=== PRICING POLICY (MANDATORY) ===";
const PRICING_CLOSE: &str = "=== END PRICING POLICY ===";

const MEMORY_IMAGE_RULE: &str = "Memory images are not included in this prompt. \
To show them, call get_memory_images with the memory id. \
Never reference images with inline markdown or invented links.";

const TOOL_GUIDANCE: &str = "=== TOOLS ===
You can look up the product catalog and promotions with tools. Never invent products, prices or promotions.
- For broad or ambiguous product questions, call browse_full_catalog.
- Call search_products only when the user gives a precise product name or SKU.
- Call list_product_categories before get_products_by_category, and pass a category exactly as it was returned.
- When the user asks about discounts, deals or promotions, call get_active_promotions.
- When the user gives a promo code, call validate_promo_code with it.
Image display: tool results carry an `image` field holding a display token of the form [IMAGE: <url> | <label>]. \
When you show that item, copy its token verbatim on its own line. \
Do not convert it to markdown, do not shorten the URL and never write image URLs you were not given.
=== END TOOLS ===";

const PRICING_POLICY: &str = "You must never disclose, estimate or compare any numeric price, discount amount or cost, \
even if the user insists or a document above mentions one. \
If the user asks about pricing, tell them our team shares pricing directly and offer to connect them with a team member or our contact channel.";

/// Everything the composer reads for one turn
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub avatar: &'a Avatar,
    pub prompt_version: Option<&'a PromptVersion>,
    /// Already selected: descending relevance, top-K
    pub knowledge: &'a [KnowledgeChunk],
    pub memories: &'a [Memory],
    pub platform: &'a PlatformContext,
    pub tools_available: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub text: String,
    /// Set when an active prompt version supplied the base text
    pub prompt_version_id: Option<String>,
    pub knowledge_chunks_used: usize,
    pub knowledge_chunks_omitted: usize,
    pub memories_included: usize,
}

#[derive(Clone)]
pub struct PromptComposer {
    counter: Arc<dyn TokenCounter>,
    knowledge_token_budget: usize,
}

impl PromptComposer {
    pub fn new(counter: Arc<dyn TokenCounter>, knowledge_token_budget: usize) -> Self {
        Self {
            counter,
            knowledge_token_budget,
        }
    }

    pub fn with_budget(knowledge_token_budget: usize) -> Self {
        Self::new(Arc::new(CharEstimateCounter::default()), knowledge_token_budget)
    }

    pub fn compose(&self, inputs: &PromptInputs<'_>) -> ComposedPrompt {
        let mut blocks: Vec<String> = Vec::with_capacity(6);

        let prompt_version_id = match inputs.prompt_version {
            Some(version) => {
                blocks.push(version_base(version));
                Some(version.id.clone())
            }
            None => {
                blocks.push(profile_base(inputs.avatar));
                None
            }
        };

        let (knowledge_block, used, omitted) = self.knowledge_block(inputs.knowledge);
        if let Some(block) = knowledge_block {
            blocks.push(block);
        }

        let memories_included = inputs.memories.iter().filter(|m| !m.is_private).count();
        if memories_included > 0 {
            blocks.push(memories_block(inputs.memories));
        }

        if inputs.tools_available {
            blocks.push(TOOL_GUIDANCE.to_string());
        }

        if !inputs.avatar.price_visible {
            blocks.push(format!("{PRICING_OPEN}\n{PRICING_POLICY}\n{PRICING_CLOSE}"));
        }

        blocks.push(platform_block(inputs.platform));

        ComposedPrompt {
            text: blocks.join("\n\n"),
            prompt_version_id,
            knowledge_chunks_used: used,
            knowledge_chunks_omitted: omitted,
            memories_included,
        }
    }

    /// Whole chunks in relevance order until the budget is spent; the first
    /// chunk is always kept. Returns the block and (used, omitted) counts.
    fn knowledge_block(&self, chunks: &[KnowledgeChunk]) -> (Option<String>, usize, usize) {
        if chunks.is_empty() {
            return (None, 0, 0);
        }
        let mut parts: Vec<String> = Vec::with_capacity(chunks.len());
        let mut spent = 0usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let part = render_chunk(i + 1, chunk);
            let cost = self.counter.count_text(&part);
            if i > 0 && spent + cost > self.knowledge_token_budget {
                break;
            }
            spent += cost;
            parts.push(part);
        }
        let used = parts.len();
        let omitted = chunks.len() - used;

        let mut block = format!(
            "{KNOWLEDGE_OPEN}\nUse these passages from the business's own documents when they are relevant. \
Prefer them over general knowledge.\n\n{}",
            parts.join(CHUNK_SEPARATOR)
        );
        if omitted > 0 {
            block.push_str(&format!(
                "\n[{omitted} lower-relevance passage(s) omitted to fit the context budget]"
            ));
        }
        block.push('\n');
        block.push_str(KNOWLEDGE_CLOSE);
        (Some(block), used, omitted)
    }
}

fn render_chunk(index: usize, chunk: &KnowledgeChunk) -> String {
    match chunk.source.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(source) => format!("[{index}] (source: {}) {}", source.trim(), chunk.content.trim()),
        None => format!("[{index}] {}", chunk.content.trim()),
    }
}

fn section(out: &mut String, label: &str, items: &[String]) {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return;
    }
    out.push_str("\n\n");
    out.push_str(label);
    out.push(':');
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
}

fn version_base(version: &PromptVersion) -> String {
    let mut out = version.system_prompt.trim().to_string();
    section(&mut out, "Personality traits", &version.personality_traits);
    section(&mut out, "Behavior rules", &version.behavior_rules);
    section(&mut out, "Compliance rules", &version.compliance_rules);
    section(&mut out, "Response guidelines", &version.response_guidelines);
    if let Some(style) = version.response_style.as_ref().and_then(response_style_lines) {
        section(&mut out, "Response style", &style);
    }
    out
}

/// Flatten a response-style object into `key: value` lines, keys sorted
fn response_style_lines(style: &serde_json::Value) -> Option<Vec<String>> {
    let obj = style.as_object()?;
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();
    let lines: Vec<String> = keys
        .into_iter()
        .filter_map(|k| {
            let v = &obj[k];
            let text = match v {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(format!("{}: {}", k.replace('_', " "), text))
        })
        .collect();
    (!lines.is_empty()).then_some(lines)
}

fn profile_base(avatar: &Avatar) -> String {
    let mut out = format!("You are {}, an AI chatbot.", avatar.name.trim());

    let non_blank = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    if let Some(custom) = non_blank(&avatar.system_prompt) {
        out.push_str("\n\n");
        out.push_str(&custom);
    }
    if let Some(context) = non_blank(&avatar.business_context).or_else(|| non_blank(&avatar.backstory)) {
        out.push_str("\n\n");
        out.push_str(&context);
    }
    let company = non_blank(&avatar.company_name);
    let industry = non_blank(&avatar.industry);
    if company.is_some() || industry.is_some() {
        out.push('\n');
    }
    if let Some(company) = company {
        out.push_str(&format!("\nCompany: {company}"));
    }
    if let Some(industry) = industry {
        out.push_str(&format!("\nIndustry: {industry}"));
    }

    section(&mut out, "Compliance rules", &avatar.compliance_rules);
    section(&mut out, "Response guidelines", &avatar.response_guidelines);
    section(&mut out, "Personality traits", &avatar.personality_traits);
    out
}

fn memories_block(memories: &[Memory]) -> String {
    let mut out = format!("{MEMORIES_OPEN}\nThings you remember:");
    for memory in memories.iter().filter(|m| !m.is_private) {
        out.push_str(&format!("\n- [id: {}] {}", memory.id, memory.title.trim()));
        if let Some(date) = memory.memory_date {
            out.push_str(&format!(" ({})", date.format("%Y-%m-%d")));
        }
        let summary = memory.one_line_summary();
        if !summary.is_empty() {
            out.push_str(": ");
            out.push_str(&summary);
        }
        if memory.image_count > 0 {
            out.push_str(&format!(" [{} image(s) available]", memory.image_count));
        }
    }
    out.push('\n');
    out.push_str(MEMORY_IMAGE_RULE);
    out.push('\n');
    out.push_str(MEMORIES_CLOSE);
    out
}

fn platform_block(ctx: &PlatformContext) -> String {
    let with = ctx
        .contact_handle
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| format!(" with {h}"))
        .unwrap_or_default();
    match ctx.platform {
        Platform::WhatsApp => format!(
            "You are chatting over WhatsApp{with}. WhatsApp does not render markdown, so answer in plain text \
and keep messages short."
        ),
        Platform::Web => format!("You are chatting in the website chat widget{with}. Markdown is supported."),
        Platform::Api => format!("You are answering through the API{with}. Markdown is supported."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, score: f32) -> KnowledgeChunk {
        KnowledgeChunk::new(text, score)
    }

    #[test]
    fn knowledge_truncates_whole_chunks_from_the_tail() {
        // ~110 tokens per 400-char chunk with the default estimate
        let composer = PromptComposer::with_budget(250);
        let chunks = vec![
            chunk(&"a".repeat(400), 0.9),
            chunk(&"b".repeat(400), 0.8),
            chunk(&"c".repeat(400), 0.7),
        ];
        let (block, used, omitted) = composer.knowledge_block(&chunks);
        let block = block.unwrap();
        assert_eq!((used, omitted), (2, 1));
        assert!(block.contains(&"b".repeat(400)));
        assert!(!block.contains(&"c".repeat(400)));
        assert!(block.contains("[1 lower-relevance passage(s) omitted to fit the context budget]"));
    }

    #[test]
    fn top_chunk_survives_a_tiny_budget() {
        let composer = PromptComposer::with_budget(1);
        let (block, used, omitted) =
            composer.knowledge_block(&[chunk(&"x".repeat(1000), 0.9), chunk("y", 0.8)]);
        assert!(block.unwrap().contains(&"x".repeat(1000)));
        assert_eq!((used, omitted), (1, 1));
    }

    #[test]
    fn whatsapp_context_names_the_contact() {
        let ctx = PlatformContext {
            platform: Platform::WhatsApp,
            contact_handle: Some("+60123456789".into()),
        };
        let text = platform_block(&ctx);
        assert!(text.starts_with("You are chatting over WhatsApp with +60123456789."));
    }

    #[test]
    fn response_style_is_sorted_and_skips_nulls() {
        let style = serde_json::json!({"tone": "friendly", "emoji_use": "rare", "length": null});
        assert_eq!(
            response_style_lines(&style).unwrap(),
            vec!["emoji use: rare", "tone: friendly"]
        );
    }
}
