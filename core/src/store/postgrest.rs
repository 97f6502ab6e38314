//! Store backed by the Supabase PostgREST interface (`/rest/v1`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AvatarStore, CatalogStore, KnowledgeSource, MemorySource};
use crate::credentials::CredentialSource;
use crate::domain::{
    de, Avatar, DiscountType, KnowledgeChunk, Memory, MemoryImage, Product, Promotion,
    PromotionScope, PromptVersion,
};
use crate::usage::{UsageRecord, UsageSink};
use crate::{EngineError, Result};

const AVATARS: &str = "avatars";
const PROMPT_VERSIONS: &str = "avatar_prompt_versions";
const PRODUCTS: &str = "chatbot_products";
const PROMOTIONS: &str = "chatbot_promotions";
const MEMORIES: &str = "avatar_memories";
const MEMORY_IMAGES: &str = "memory_images";
const ASSIGNED_KEYS: &str = "admin_assigned_api_keys";
const USER_KEYS: &str = "user_api_keys";
const USAGE_LOGS: &str = "model_usage_logs";
const KNOWLEDGE_RPC: &str = "match_knowledge_chunks";
const PROMPT_USAGE_RPC: &str = "increment_prompt_version_usage";

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    pub url: String, // e.g., https://<project>.supabase.co
    pub service_key: String,
    pub timeout_ms: u64,
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("SUPABASE_URL").unwrap_or_default(),
            service_key: std::env::var("SUPABASE_SERVICE_KEY").unwrap_or_default(),
            timeout_ms: std::env::var("SUPABASE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10_000),
        }
    }
}

/// PostgREST filter set; values are URL-encoded by reqwest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default().select("*")
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.retain(|(k, _)| k != "select");
        self.params.push(("select".into(), columns.into()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.params.push((column.into(), format!("eq.{value}")));
        self
    }

    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.params.push((column.into(), format!("ilike.{pattern}")));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.params.push((column.into(), "not.is.null".into()));
        self
    }

    /// `or=(a.op.v,b.op.v)`
    pub fn or(mut self, conditions: &[String]) -> Self {
        if !conditions.is_empty() {
            self.params
                .push(("or".into(), format!("({})", conditions.join(","))));
        }
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        self.params
            .push(("order".into(), format!("{column}.{dir}.nullslast")));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".into(), n.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Strip characters that carry meaning inside an `or=(...)` filter list
fn filter_literal(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '"' | '\\'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Escape LIKE wildcards so `ilike` compares the whole value case-insensitively
fn like_exact(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `*` is still a wildcard for PostgREST, so the final pick happens here
fn code_match(promotions: Vec<Promotion>, code: &str) -> Option<Promotion> {
    promotions.into_iter().find(|p| {
        p.promo_code
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(code))
    })
}

pub struct PostgrestStore {
    http: Client,
    cfg: PostgrestConfig,
}

impl PostgrestStore {
    pub fn new(cfg: PostgrestConfig) -> Result<Self> {
        if cfg.url.trim().is_empty() || cfg.service_key.trim().is_empty() {
            return Err(EngineError::Configuration(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY must be set".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| EngineError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(PostgrestConfig::default())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.cfg.url.trim_end_matches('/'), path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.cfg.service_key)
            .bearer_auth(&self.cfg.service_key)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Value> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| EngineError::Store(format!("{what}: request failed: {e}")))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::Store(format!(
                "{what}: HTTP {}: {}",
                status.as_u16(),
                crate::preview(&text, 200)
            )));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        debug!(target: "postgrest", table = table, params = ?query.params(), "GET");
        let req = self.http.get(self.url(table)).query(query.params());
        match self.send(req, table).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(EngineError::Store(format!(
                "{table}: expected array, got {}",
                crate::preview(&other.to_string(), 80)
            ))),
        }
    }

    async fn select_one<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<Option<T>> {
        let rows = self.select(table, &query.limit(1)).await?;
        Ok(decode_rows::<T>(table, rows).into_iter().next())
    }

    async fn rpc(&self, function: &str, args: &Value) -> Result<Value> {
        debug!(target: "postgrest", function = function, "RPC");
        let req = self.http.post(self.url(&format!("rpc/{function}"))).json(args);
        self.send(req, function).await
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<()> {
        let req = self
            .http
            .post(self.url(table))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(req, table).await.map(|_| ())
    }

    async fn products(&self, query: Query) -> Result<Vec<Product>> {
        let rows = self.select(PRODUCTS, &query).await?;
        Ok(valid_products(decode_rows(PRODUCTS, rows)))
    }

    async fn promotions(&self, query: Query) -> Result<Vec<Promotion>> {
        let rows = self.select(PROMOTIONS, &query).await?;
        Ok(decode_rows::<PromotionRow>(PROMOTIONS, rows)
            .into_iter()
            .map(Promotion::from)
            .filter(|p| match p.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(target: "postgrest", promotion_id = %p.id, error = %e, "Skipping invalid promotion row");
                    false
                }
            })
            .collect())
    }
}

/// Decode rows one by one; rows that do not fit the type are skipped
fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(target: "postgrest", table = table, error = %e, "Skipping undecodable row");
                None
            }
        })
        .collect()
}

fn valid_products(products: Vec<Product>) -> Vec<Product> {
    products
        .into_iter()
        .filter(|p| match p.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "postgrest", product_id = %p.id, error = %e, "Skipping invalid product row");
                false
            }
        })
        .collect()
}

/// Promotion as stored: scope spread over three columns
#[derive(Debug, Deserialize)]
struct PromotionRow {
    id: String,
    chatbot_id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    promo_code: Option<String>,
    discount_type: DiscountType,
    #[serde(deserialize_with = "de::number_or_string")]
    discount_value: f64,
    #[serde(default)]
    start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "de::default_true", deserialize_with = "de::bool_default_true")]
    is_active: bool,
    #[serde(default)]
    current_uses: Option<i64>,
    #[serde(default)]
    max_uses: Option<i64>,
    #[serde(default)]
    applies_to: Option<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    applicable_categories: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    applicable_product_ids: Vec<String>,
    #[serde(default)]
    banner_image_url: Option<String>,
}

impl From<PromotionRow> for Promotion {
    fn from(row: PromotionRow) -> Self {
        let scope = match row.applies_to.as_deref().map(str::trim) {
            Some("category") | Some("categories") => {
                PromotionScope::Categories(row.applicable_categories)
            }
            Some("product") | Some("products") | Some("specific_products") => {
                PromotionScope::Products(row.applicable_product_ids)
            }
            _ => PromotionScope::All,
        };
        Promotion {
            id: row.id,
            chatbot_id: row.chatbot_id,
            title: row.title,
            description: row.description,
            promo_code: row.promo_code,
            discount_type: row.discount_type,
            discount_value: row.discount_value,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            current_uses: row.current_uses.unwrap_or(0),
            max_uses: row.max_uses,
            scope,
            image_url: row.banner_image_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeyRow {
    #[serde(default)]
    api_key: Option<String>,
}

#[async_trait]
impl AvatarStore for PostgrestStore {
    async fn get_avatar(&self, avatar_id: &str) -> Result<Option<Avatar>> {
        self.select_one(AVATARS, Query::new().eq("id", avatar_id)).await
    }

    async fn get_active_prompt_version(&self, avatar_id: &str) -> Result<Option<PromptVersion>> {
        self.select_one(
            PROMPT_VERSIONS,
            Query::new()
                .eq("avatar_id", avatar_id)
                .eq("is_active", true)
                .order("created_at", false),
        )
        .await
    }
}

#[async_trait]
impl KnowledgeSource for PostgrestStore {
    async fn search_knowledge(
        &self,
        avatar_id: &str,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<KnowledgeChunk>> {
        let args = json!({
            "p_avatar_id": avatar_id,
            "query_text": query,
            "match_count": top_k,
            "match_threshold": min_similarity,
        });
        match self.rpc(KNOWLEDGE_RPC, &args).await? {
            Value::Array(rows) => Ok(decode_rows(KNOWLEDGE_RPC, rows)),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl MemorySource for PostgrestStore {
    async fn get_recent_memories(&self, avatar_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let rows = self
            .select(
                MEMORIES,
                &Query::new()
                    .eq("avatar_id", avatar_id)
                    .eq("is_private", false)
                    .order("memory_date", false)
                    .limit(limit),
            )
            .await?;
        Ok(decode_rows(MEMORIES, rows))
    }

    async fn get_memory(&self, memory_id: &str) -> Result<Option<Memory>> {
        self.select_one(MEMORIES, Query::new().eq("id", memory_id)).await
    }

    async fn get_memory_images(&self, memory_id: &str) -> Result<Vec<MemoryImage>> {
        let rows = self
            .select(
                MEMORY_IMAGES,
                &Query::new()
                    .eq("memory_id", memory_id)
                    .order("display_order", true),
            )
            .await?;
        Ok(decode_rows(MEMORY_IMAGES, rows))
    }
}

#[async_trait]
impl CatalogStore for PostgrestStore {
    async fn list_products(
        &self,
        chatbot_id: &str,
        include_out_of_stock: bool,
    ) -> Result<Vec<Product>> {
        let mut query = Query::new().eq("chatbot_id", chatbot_id);
        if !include_out_of_stock {
            query = query.eq("in_stock", true);
        }
        self.products(query.order("category", true).order("name", true))
            .await
    }

    async fn search_products(
        &self,
        chatbot_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let term = filter_literal(query);
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let conditions: Vec<String> = ["name", "category", "sku", "description"]
            .iter()
            .map(|col| format!("{col}.ilike.*{term}*"))
            .collect();
        self.products(
            Query::new()
                .eq("chatbot_id", chatbot_id)
                .or(&conditions)
                .order("name", true)
                .limit(limit),
        )
        .await
    }

    async fn get_product(&self, chatbot_id: &str, product_id: &str) -> Result<Option<Product>> {
        let products = self
            .products(
                Query::new()
                    .eq("chatbot_id", chatbot_id)
                    .eq("id", product_id)
                    .limit(1),
            )
            .await?;
        Ok(products.into_iter().next())
    }

    async fn list_categories(&self, chatbot_id: &str) -> Result<Vec<String>> {
        let rows = self
            .select(
                PRODUCTS,
                &Query::new()
                    .select("category")
                    .eq("chatbot_id", chatbot_id)
                    .not_null("category"),
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("category").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn products_by_category(
        &self,
        chatbot_id: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        self.products(
            Query::new()
                .eq("chatbot_id", chatbot_id)
                .ilike("category", &like_exact(category.trim()))
                .order("name", true)
                .limit(limit),
        )
        .await
    }

    async fn list_promotions(&self, chatbot_id: &str) -> Result<Vec<Promotion>> {
        self.promotions(
            Query::new()
                .eq("chatbot_id", chatbot_id)
                .eq("is_active", true)
                .order("created_at", false),
        )
        .await
    }

    async fn find_promotion_by_code(
        &self,
        chatbot_id: &str,
        code: &str,
    ) -> Result<Option<Promotion>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let promotions = self
            .promotions(
                Query::new()
                    .eq("chatbot_id", chatbot_id)
                    .ilike("promo_code", &like_exact(code)),
            )
            .await?;
        Ok(code_match(promotions, code))
    }
}

#[async_trait]
impl CredentialSource for PostgrestStore {
    async fn operator_assigned_key(&self, user_id: &str) -> Result<Option<String>> {
        let row: Option<KeyRow> = self
            .select_one(
                ASSIGNED_KEYS,
                Query::new()
                    .select("api_key")
                    .eq("assigned_user_id", user_id)
                    .eq("is_active", true),
            )
            .await?;
        Ok(row.and_then(|r| r.api_key))
    }

    async fn user_key(&self, user_id: &str) -> Result<Option<String>> {
        let row: Option<KeyRow> = self
            .select_one(
                USER_KEYS,
                Query::new().select("api_key").eq("user_id", user_id),
            )
            .await?;
        Ok(row.and_then(|r| r.api_key))
    }
}

#[async_trait]
impl UsageSink for PostgrestStore {
    async fn record_model_usage(&self, record: UsageRecord) -> Result<()> {
        self.insert(USAGE_LOGS, &serde_json::to_value(&record)?).await
    }

    async fn record_prompt_version_usage(&self, version_id: &str) -> Result<()> {
        self.rpc(PROMPT_USAGE_RPC, &json!({ "p_version_id": version_id }))
            .await
            .map(|_| ())
    }
}
