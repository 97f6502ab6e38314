use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::discount::{apply_promotions, PricedProduct};
use crate::domain::{Product, Promotion};
use crate::store::CatalogStore;
use crate::Result;

/// Outcome of checking a promo code
#[derive(Debug, Clone, PartialEq)]
pub struct PromoValidation {
    pub valid: bool,
    pub promotion: Option<Promotion>,
    pub reason: Option<String>,
}

/// Read-only catalog queries for one datastore
#[derive(Clone)]
pub struct CatalogAccessor {
    store: Arc<dyn CatalogStore>,
}

impl CatalogAccessor {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn browse_catalog(
        &self,
        chatbot_id: &str,
        include_out_of_stock: bool,
    ) -> Result<Vec<Product>> {
        let products = self
            .store
            .list_products(chatbot_id, include_out_of_stock)
            .await?;
        debug!(target: "catalog", chatbot_id = %chatbot_id, count = products.len(), include_out_of_stock, "Browsed catalog");
        Ok(products
            .into_iter()
            .filter(|p| include_out_of_stock || p.in_stock)
            .collect())
    }

    pub async fn search_products(
        &self,
        chatbot_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut products = self.store.search_products(chatbot_id, query, limit).await?;
        products.truncate(limit);
        Ok(products)
    }

    pub async fn get_product_by_id(&self, chatbot_id: &str, id: &str) -> Result<Option<Product>> {
        self.store.get_product(chatbot_id, id).await
    }

    /// Distinct, non-blank categories in sorted order
    pub async fn list_categories(&self, chatbot_id: &str) -> Result<Vec<String>> {
        let raw = self.store.list_categories(chatbot_id).await?;
        let distinct: BTreeSet<String> = raw
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Ok(distinct.into_iter().collect())
    }

    pub async fn get_products_by_category(
        &self,
        chatbot_id: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let mut products = self
            .store
            .products_by_category(chatbot_id, category.trim(), limit)
            .await?;
        products.truncate(limit);
        Ok(products)
    }

    /// Promotions that are active at `now` (flag, window and usage cap)
    pub async fn get_active_promotions(
        &self,
        chatbot_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Promotion>> {
        let promotions = self.store.list_promotions(chatbot_id).await?;
        Ok(promotions
            .into_iter()
            .filter(|p| p.is_active_at(now))
            .take(limit)
            .collect())
    }

    pub async fn validate_promo_code(
        &self,
        chatbot_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<PromoValidation> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(PromoValidation {
                valid: false,
                promotion: None,
                reason: Some("empty code".to_string()),
            });
        }
        let found = self.store.find_promotion_by_code(chatbot_id, code).await?;
        // Backends may match codes loosely
        let found = found.filter(|p| {
            p.promo_code
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(code))
        });
        Ok(match found {
            None => PromoValidation {
                valid: false,
                promotion: None,
                reason: Some("code not found".to_string()),
            },
            Some(promo) => match promo.inactive_reason(now) {
                Some(reason) => PromoValidation {
                    valid: false,
                    promotion: Some(promo),
                    reason: Some(reason.to_string()),
                },
                None => PromoValidation {
                    valid: true,
                    promotion: Some(promo),
                    reason: None,
                },
            },
        })
    }

    /// Resolve discounts for `products` against the chatbot's promotions
    pub async fn price(
        &self,
        chatbot_id: &str,
        products: Vec<Product>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PricedProduct>> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let promotions = self.store.list_promotions(chatbot_id).await?;
        Ok(apply_promotions(products, &promotions, now))
    }
}
