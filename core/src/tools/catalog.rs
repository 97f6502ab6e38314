//! Catalog tools. Descriptions carry the dispatch guidance the model follows.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::error::ToolResult;
use super::traits::{limit_arg, required_str, Tool, ToolContext, ToolOutput};
use crate::catalog::{
    product_directives, promotion_directive, CatalogAccessor, DisplayDirective, ProductView,
    PromotionView,
};
use crate::domain::Product;

const BROWSE_MAX: usize = 200;
const UNCATEGORIZED: &str = "Other";

pub fn catalog_tools(catalog: CatalogAccessor) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(BrowseFullCatalogTool(catalog.clone())),
        Arc::new(SearchProductsTool(catalog.clone())),
        Arc::new(GetProductByIdTool(catalog.clone())),
        Arc::new(ListProductCategoriesTool(catalog.clone())),
        Arc::new(GetProductsByCategoryTool(catalog.clone())),
        Arc::new(GetActivePromotionsTool(catalog.clone())),
        Arc::new(ValidatePromoCodeTool(catalog)),
    ]
}

/// Price, redact and collect directives for a product list
async fn product_views(
    catalog: &CatalogAccessor,
    ctx: &ToolContext,
    products: Vec<Product>,
    all_images: bool,
) -> ToolResult<(Vec<ProductView>, Vec<DisplayDirective>)> {
    let priced = catalog.price(&ctx.chatbot_id, products, ctx.now).await?;
    let mut views = Vec::with_capacity(priced.len());
    let mut directives = Vec::new();
    for p in &priced {
        views.push(ProductView::from_priced(p, ctx.price_visible, all_images));
        directives.extend(product_directives(p, all_images));
    }
    Ok((views, directives))
}

pub struct BrowseFullCatalogTool(CatalogAccessor);

#[async_trait]
impl Tool for BrowseFullCatalogTool {
    fn name(&self) -> String {
        "browse_full_catalog".to_string()
    }

    fn description(&self) -> String {
        "List the whole product catalog grouped by category. Prefer this for broad or ambiguous \
product questions (\"what do you sell?\", \"show me your products\", a vague product type)."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_out_of_stock": {
                    "type": "boolean",
                    "description": "Also list items that are currently out of stock (default false)"
                }
            }
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let include_out_of_stock = arguments
            .get("include_out_of_stock")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut products = self
            .0
            .browse_catalog(&ctx.chatbot_id, include_out_of_stock)
            .await?;
        let total = products.len();
        products.truncate(BROWSE_MAX);

        let (views, directives) = product_views(&self.0, ctx, products, false).await?;
        let mut groups: BTreeMap<String, Vec<ProductView>> = BTreeMap::new();
        for view in views {
            let key = view.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string());
            groups.entry(key).or_default().push(view);
        }
        debug!(target: "catalog", chatbot_id = %ctx.chatbot_id, total, groups = groups.len(), "browse_full_catalog");

        let categories: Vec<Value> = groups
            .into_iter()
            .map(|(category, products)| json!({ "category": category, "products": products }))
            .collect();
        let mut data = json!({
            "total_products": total,
            "categories": categories,
        });
        if total > BROWSE_MAX {
            data["note"] = json!(format!("Showing the first {BROWSE_MAX} of {total} products."));
        }
        if total == 0 {
            data["note"] = json!("The catalog is empty.");
        }
        Ok(ToolOutput::new(data).with_directives(directives))
    }
}

pub struct SearchProductsTool(CatalogAccessor);

#[async_trait]
impl Tool for SearchProductsTool {
    fn name(&self) -> String {
        "search_products".to_string()
    }

    fn description(&self) -> String {
        "Look up products by an exact or near-exact name or SKU. Use only when the user already \
names a precise product or code; for general questions use browse_full_catalog."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Product name or SKU" },
                "limit": { "type": "integer", "description": "Maximum results (default 10)" }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let query = required_str(&arguments, "query")?;
        let limit = limit_arg(&arguments, "limit", 10, 50);
        let products = self.0.search_products(&ctx.chatbot_id, query, limit).await?;
        let (views, directives) = product_views(&self.0, ctx, products, false).await?;
        let count = views.len();
        let mut data = json!({
            "query": query,
            "count": count,
            "products": views,
        });
        if count == 0 {
            data["note"] = json!("No match. Try browse_full_catalog to see everything on offer.");
        }
        Ok(ToolOutput::new(data).with_directives(directives))
    }
}

pub struct GetProductByIdTool(CatalogAccessor);

#[async_trait]
impl Tool for GetProductByIdTool {
    fn name(&self) -> String {
        "get_product_by_id".to_string()
    }

    fn description(&self) -> String {
        "Get full details of one product, including all of its images, by the id returned from \
another catalog tool."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "description": "Product id from a previous result" }
            },
            "required": ["product_id"]
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let id = required_str(&arguments, "product_id")?;
        let Some(product) = self.0.get_product_by_id(&ctx.chatbot_id, id).await? else {
            return Ok(ToolOutput::new(json!({
                "found": false,
                "product_id": id,
            })));
        };
        let (mut views, directives) = product_views(&self.0, ctx, vec![product], true).await?;
        let view = views.pop();
        Ok(ToolOutput::new(json!({ "found": true, "product": view })).with_directives(directives))
    }
}

pub struct ListProductCategoriesTool(CatalogAccessor);

#[async_trait]
impl Tool for ListProductCategoriesTool {
    fn name(&self) -> String {
        "list_product_categories".to_string()
    }

    fn description(&self) -> String {
        "List the product categories. Always call this before get_products_by_category so the \
category name is exact."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, ctx: &ToolContext, _arguments: Value) -> ToolResult<ToolOutput> {
        let categories = self.0.list_categories(&ctx.chatbot_id).await?;
        Ok(ToolOutput::new(json!({
            "count": categories.len(),
            "categories": categories,
        })))
    }
}

pub struct GetProductsByCategoryTool(CatalogAccessor);

#[async_trait]
impl Tool for GetProductsByCategoryTool {
    fn name(&self) -> String {
        "get_products_by_category".to_string()
    }

    fn description(&self) -> String {
        "List products in one category. Only pass a category string exactly as returned by \
list_product_categories."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "description": "Exact category name" },
                "limit": { "type": "integer", "description": "Maximum results (default 20)" }
            },
            "required": ["category"]
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let category = required_str(&arguments, "category")?;
        let limit = limit_arg(&arguments, "limit", 20, 100);
        let products = self
            .0
            .get_products_by_category(&ctx.chatbot_id, category, limit)
            .await?;
        let (views, directives) = product_views(&self.0, ctx, products, false).await?;
        let count = views.len();
        let mut data = json!({
            "category": category,
            "count": count,
            "products": views,
        });
        if count == 0 {
            data["note"] =
                json!("No products in that category. Call list_product_categories for exact names.");
        }
        Ok(ToolOutput::new(data).with_directives(directives))
    }
}

pub struct GetActivePromotionsTool(CatalogAccessor);

#[async_trait]
impl Tool for GetActivePromotionsTool {
    fn name(&self) -> String {
        "get_active_promotions".to_string()
    }

    fn description(&self) -> String {
        "List promotions running right now. Call when the user asks about discounts, promos, \
deals, sales or offers."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Maximum results (default 10)" }
            }
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let limit = limit_arg(&arguments, "limit", 10, 50);
        let promotions = self
            .0
            .get_active_promotions(&ctx.chatbot_id, limit, ctx.now)
            .await?;
        let directives: Vec<DisplayDirective> =
            promotions.iter().filter_map(promotion_directive).collect();
        let views: Vec<PromotionView> = promotions
            .iter()
            .map(|p| PromotionView::from_promotion(p, ctx.price_visible, &ctx.currency))
            .collect();
        let count = views.len();
        Ok(ToolOutput::new(json!({
            "count": count,
            "promotions": views,
        }))
        .with_directives(directives))
    }
}

pub struct ValidatePromoCodeTool(CatalogAccessor);

#[async_trait]
impl Tool for ValidatePromoCodeTool {
    fn name(&self) -> String {
        "validate_promo_code".to_string()
    }

    fn description(&self) -> String {
        "Check whether a promo code the user typed is valid right now and what it gives. Call \
whenever the user supplies a literal code."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "The code exactly as the user wrote it" }
            },
            "required": ["code"]
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> ToolResult<ToolOutput> {
        let code = required_str(&arguments, "code")?;
        let check = self
            .0
            .validate_promo_code(&ctx.chatbot_id, code, ctx.now)
            .await?;
        let directives: Vec<DisplayDirective> = check
            .promotion
            .as_ref()
            .filter(|_| check.valid)
            .and_then(promotion_directive)
            .into_iter()
            .collect();
        let promotion = check
            .promotion
            .as_ref()
            .map(|p| PromotionView::from_promotion(p, ctx.price_visible, &ctx.currency));
        let mut data = json!({
            "code": code,
            "valid": check.valid,
        });
        if let Some(reason) = &check.reason {
            data["reason"] = json!(reason);
        }
        if let Some(view) = promotion {
            data["promotion"] = serde_json::to_value(view)?;
        }
        Ok(ToolOutput::new(data).with_directives(directives))
    }
}
