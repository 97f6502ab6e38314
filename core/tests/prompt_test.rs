mod common;

use avatar_core::domain::{KnowledgeChunk, Memory, Platform, PlatformContext};
use avatar_core::prompt::{PromptComposer, PromptInputs};
use chrono::NaiveDate;
use common::{avatar, prompt_version};
use serde_json::json;

fn memory(id: &str, title: &str, private: bool) -> Memory {
    Memory {
        id: id.into(),
        avatar_id: common::AVATAR.into(),
        title: title.into(),
        memory_date: NaiveDate::from_ymd_opt(2019, 3, 2),
        summary: "We opened the first shop\non Penang Road.".into(),
        details: None,
        image_count: 2,
        is_private: private,
    }
}

#[test]
fn active_version_replaces_profile_fields() {
    let composer = PromptComposer::with_budget(3000);
    let avatar = avatar(true);
    let version = prompt_version("pv-3", "You are Mia, the trained shop assistant.");
    let platform = PlatformContext::default();

    let composed = composer.compose(&PromptInputs {
        avatar: &avatar,
        prompt_version: Some(&version),
        knowledge: &[],
        memories: &[],
        platform: &platform,
        tools_available: true,
    });

    assert_eq!(composed.prompt_version_id.as_deref(), Some("pv-3"));
    assert!(composed.text.starts_with("You are Mia, the trained shop assistant."));
    assert!(composed.text.contains("Behavior rules:\n- Greet returning customers by name"));
    assert!(composed.text.contains("- No medical claims"));
    // profile fields never leak in alongside a version
    assert!(!composed.text.contains("Kedai Telefon Mia"));
    assert!(!composed.text.contains("Never promise repairs under warranty"));
    assert!(!composed.text.contains("behind the counter"));
}

#[test]
fn profile_is_used_without_a_version() {
    let composer = PromptComposer::with_budget(3000);
    let avatar = avatar(true);
    let platform = PlatformContext::default();

    let composed = composer.compose(&PromptInputs {
        avatar: &avatar,
        prompt_version: None,
        knowledge: &[],
        memories: &[],
        platform: &platform,
        tools_available: false,
    });

    assert!(composed.prompt_version_id.is_none());
    assert!(composed.text.starts_with("You are Mia, an AI chatbot."));
    assert!(composed.text.contains("Company: Kedai Telefon Mia"));
    assert!(composed.text.contains("Industry: Consumer electronics retail"));
    assert!(composed.text.contains("Compliance rules:\n- Never promise repairs under warranty"));
    // business context wins over backstory
    assert!(!composed.text.contains("behind the counter"));
    assert!(!composed.text.contains("=== TOOLS ==="));
}

#[test]
fn composition_is_deterministic() {
    let composer = PromptComposer::with_budget(3000);
    let avatar = avatar(false);
    let version = prompt_version("pv-3", "Base");
    let knowledge = vec![
        KnowledgeChunk::new("Shipping takes five days.", 0.9),
        KnowledgeChunk::new("Returns within 14 days.", 0.7),
    ];
    let memories = vec![memory("m-1", "Opening day", false)];
    let platform = PlatformContext {
        platform: Platform::WhatsApp,
        contact_handle: Some("+60123456789".into()),
    };
    let inputs = PromptInputs {
        avatar: &avatar,
        prompt_version: Some(&version),
        knowledge: &knowledge,
        memories: &memories,
        platform: &platform,
        tools_available: true,
    };

    assert_eq!(composer.compose(&inputs), composer.compose(&inputs));
}

#[test]
fn pricing_block_follows_price_visibility() {
    let composer = PromptComposer::with_budget(3000);
    let platform = PlatformContext::default();

    for (price_visible, with_version) in [(true, false), (true, true), (false, false), (false, true)] {
        let avatar = avatar(price_visible);
        let version = prompt_version("pv-3", "Base");
        let composed = composer.compose(&PromptInputs {
            avatar: &avatar,
            prompt_version: with_version.then_some(&version),
            knowledge: &[],
            memories: &[],
            platform: &platform,
            tools_available: true,
        });
        assert_eq!(
            composed.text.contains("=== PRICING POLICY (MANDATORY) ==="),
            !price_visible,
            "price_visible={price_visible} with_version={with_version}"
        );
    }
}

#[test]
fn blocks_appear_in_fixed_order() {
    let composer = PromptComposer::with_budget(3000);
    let avatar = avatar(false);
    let knowledge = vec![KnowledgeChunk::new("Shipping takes five days.", 0.9)];
    let memories = vec![memory("m-1", "Opening day", false)];
    let platform = PlatformContext {
        platform: Platform::Web,
        contact_handle: None,
    };
    let text = composer
        .compose(&PromptInputs {
            avatar: &avatar,
            prompt_version: None,
            knowledge: &knowledge,
            memories: &memories,
            platform: &platform,
            tools_available: true,
        })
        .text;

    let positions: Vec<usize> = [
        "You are Mia",
        "=== KNOWLEDGE BASE ===",
        "=== MEMORIES ===",
        "=== TOOLS ===",
        "=== PRICING POLICY (MANDATORY) ===",
        "website chat widget",
    ]
    .iter()
    .map(|marker| text.find(marker).unwrap_or_else(|| panic!("missing {marker}")))
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[test]
fn memories_block_lists_ids_and_skips_private() {
    let composer = PromptComposer::with_budget(3000);
    let avatar = avatar(true);
    let memories = vec![
        memory("m-1", "Shop opening day", false),
        memory("m-2", "Family dinner", true),
    ];
    let platform = PlatformContext::default();
    let composed = composer.compose(&PromptInputs {
        avatar: &avatar,
        prompt_version: None,
        knowledge: &[],
        memories: &memories,
        platform: &platform,
        tools_available: true,
    });

    assert_eq!(composed.memories_included, 1);
    assert!(composed.text.contains(
        "- [id: m-1] Shop opening day (2019-03-02): We opened the first shop on Penang Road. [2 image(s) available]"
    ));
    assert!(!composed.text.contains("Family dinner"));
    assert!(composed.text.contains("call get_memory_images"));
}

#[test]
fn response_style_is_flattened_with_sorted_keys() {
    let composer = PromptComposer::with_budget(3000);
    let avatar = avatar(true);
    let mut version = prompt_version("pv-3", "Base");
    version.response_style = Some(json!({ "tone": "friendly", "emoji_use": "rare", "length": null }));
    let platform = PlatformContext::default();
    let text = composer
        .compose(&PromptInputs {
            avatar: &avatar,
            prompt_version: Some(&version),
            knowledge: &[],
            memories: &[],
            platform: &platform,
            tools_available: false,
        })
        .text;
    assert!(text.contains("Response style:\n- emoji use: rare\n- tone: friendly"));
    assert!(!text.contains("length"));
}
