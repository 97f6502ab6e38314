#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use avatar_core::domain::{
    Avatar, DiscountType, KnowledgeChunk, Memory, MemoryImage, Product, Promotion, PromotionScope,
    PromptVersion,
};
use avatar_core::llm::{CompletionRequest, LanguageModel, ModelTurn, ToolCall};
use avatar_core::{ChatEngine, EngineConfig, InMemoryStore, Result};
use chrono::{NaiveDate, Utc};
use serde_json::Value;

pub const AVATAR: &str = "av-1";
pub const USER: &str = "user-1";

/// Fixed values so tests never depend on the environment
pub fn test_config() -> EngineConfig {
    EngineConfig {
        max_tool_rounds: 6,
        history_turns: 30,
        knowledge_top_k: 5,
        knowledge_min_similarity: 0.3,
        knowledge_token_budget: 3000,
        memory_limit: 10,
        turn_timeout_ms: 5_000,
        tool_timeout_ms: 2_000,
        temperature: 0.7,
        default_model: "gpt-4o-mini".to_string(),
        parallel_tools: true,
    }
}

pub fn avatar(price_visible: bool) -> Avatar {
    let mut a = Avatar::new(AVATAR, USER, "Mia");
    a.backstory = Some("Mia grew up behind the counter of her family's phone shop.".into());
    a.business_context = Some("Mia answers questions for Kedai Telefon Mia, a phone shop in Penang.".into());
    a.company_name = Some("Kedai Telefon Mia".into());
    a.industry = Some("Consumer electronics retail".into());
    a.compliance_rules = vec!["Never promise repairs under warranty".into()];
    a.response_guidelines = vec!["Keep answers under five sentences".into()];
    a.personality_traits = vec!["warm".into(), "concise".into()];
    a.price_visible = price_visible;
    a
}

pub fn prompt_version(id: &str, text: &str) -> PromptVersion {
    PromptVersion {
        id: id.into(),
        avatar_id: AVATAR.into(),
        version_number: 3,
        system_prompt: text.into(),
        personality_traits: vec!["cheerful".into()],
        behavior_rules: vec!["Greet returning customers by name".into()],
        compliance_rules: vec!["No medical claims".into()],
        response_guidelines: vec!["Use short paragraphs".into()],
        response_style: None,
        is_active: true,
        parent_version_id: Some("pv-2".into()),
        created_at: Utc::now(),
    }
}

pub fn product(id: &str, sku: &str, name: &str, category: &str, price: f64, in_stock: bool) -> Product {
    Product {
        id: id.into(),
        chatbot_id: AVATAR.into(),
        sku: sku.into(),
        name: name.into(),
        description: Some(format!("{name} from our {category} range")),
        price,
        currency: "MYR".into(),
        category: Some(category.into()),
        in_stock,
        stock_quantity: Some(if in_stock { 5 } else { 0 }),
        images: vec![format!("https://cdn.example.com/{id}.jpg")],
        tags: vec![],
    }
}

pub fn promo(id: &str, kind: DiscountType, value: f64, scope: PromotionScope) -> Promotion {
    Promotion {
        id: id.into(),
        chatbot_id: AVATAR.into(),
        title: format!("Promo {id}"),
        description: None,
        promo_code: None,
        discount_type: kind,
        discount_value: value,
        start_date: None,
        end_date: None,
        is_active: true,
        current_uses: 0,
        max_uses: None,
        scope,
        image_url: None,
    }
}

/// Avatar, operator key, a small phone-shop catalog and promotions
pub fn seeded_store(price_visible: bool) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.insert_avatar(avatar(price_visible));
    store.set_operator_key(USER, "sk-operator");

    for p in [
        product("p-1", "GS24", "Galaxy S24", "Phones", 3999.0, true),
        product("p-2", "PX8", "Pixel 8", "Phones", 2999.0, false),
        product("c-1", "CC-CLR", "Clear Case", "Cases", 49.0, true),
    ] {
        store.insert_product(p).unwrap();
    }

    let mut raya = promo("raya", DiscountType::Percentage, 15.0, PromotionScope::All);
    raya.title = "Raya Sale".into();
    raya.promo_code = Some("RAYA".into());
    raya.image_url = Some("https://cdn.example.com/raya.jpg".into());
    store.insert_promotion(raya).unwrap();

    let mut save10 = promo("save10", DiscountType::Percentage, 10.0, PromotionScope::All);
    save10.promo_code = Some("SAVE10".into());
    save10.max_uses = Some(1);
    save10.current_uses = 1;
    store.insert_promotion(save10).unwrap();

    let mut case20 = promo(
        "case20",
        DiscountType::FixedAmount,
        20.0,
        PromotionScope::Categories(vec!["Cases".into()]),
    );
    case20.promo_code = Some("CASE20".into());
    store.insert_promotion(case20).unwrap();

    store.insert_memory(Memory {
        id: "m-1".into(),
        avatar_id: AVATAR.into(),
        title: "Shop opening day".into(),
        memory_date: NaiveDate::from_ymd_opt(2019, 3, 2),
        summary: "We opened the first shop\non Penang Road.".into(),
        details: None,
        image_count: 2,
        is_private: false,
    });
    store.insert_memory(Memory {
        id: "m-secret".into(),
        avatar_id: AVATAR.into(),
        title: "Private family dinner".into(),
        memory_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        summary: "Not for customers.".into(),
        details: None,
        image_count: 1,
        is_private: true,
    });
    for (i, url) in ["https://cdn.example.com/open-1.jpg", "https://cdn.example.com/open-2.jpg"]
        .iter()
        .enumerate()
    {
        store.insert_memory_image(MemoryImage {
            id: format!("img-{i}"),
            memory_id: "m-1".into(),
            url: url.to_string(),
            caption: None,
        });
    }
    store.insert_memory_image(MemoryImage {
        id: "img-secret".into(),
        memory_id: "m-secret".into(),
        url: "https://cdn.example.com/secret.jpg".into(),
        caption: Some("dinner".into()),
    });

    store.insert_knowledge(
        AVATAR,
        KnowledgeChunk::new("We ship to Sabah and Sarawak within five working days.", 0.0),
    );
    store.insert_knowledge(
        AVATAR,
        KnowledgeChunk::new("Store opening hours are 10am to 10pm daily.", 0.0),
    );

    Arc::new(store)
}

pub fn engine(store: Arc<InMemoryStore>, model: Arc<dyn LanguageModel>) -> ChatEngine {
    ChatEngine::from_store(store, model, test_config())
}

pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

/// Replays scripted turns and records every request it receives.
/// Once the script runs out the last turn repeats.
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ModelTurn>>,
    last: Mutex<Option<ModelTurn>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.turns.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        let turn = match next {
            Some(turn) => turn,
            None => last.clone().unwrap_or_else(|| ModelTurn::text("")),
        };
        *last = Some(turn.clone());
        Ok(turn)
    }
}

const PRICE_KEYS: [&str; 6] = [
    "price",
    "currency",
    "discounted_price",
    "discount_display",
    "discount_value",
    "discount_type",
];

/// Paths of every price-bearing key anywhere in `v`
pub fn price_keys(v: &Value, path: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let p = format!("{path}.{k}");
                if PRICE_KEYS.contains(&k.as_str()) {
                    out.push(p.clone());
                }
                price_keys(child, &p, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                price_keys(child, &format!("{path}[{i}]"), out);
            }
        }
        _ => {}
    }
}
