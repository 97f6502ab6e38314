use serde::Serialize;

use super::directive::DisplayDirective;
use super::discount::PricedProduct;
use crate::domain::{DiscountType, Promotion};

pub const PRICE_HIDDEN_MESSAGE: &str = "Please contact us for pricing.";

/// Product as serialized into tool results.
///
/// With prices hidden every price and discount field is `None` (and therefore
/// absent) and `price_hidden` carries the contact-us note instead.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductView {
    pub id: String,
    pub sku: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub in_stock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_discount: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ProductView {
    /// Redaction runs here, after discounts were computed on full prices
    pub fn from_priced(priced: &PricedProduct, price_visible: bool, all_images: bool) -> Self {
        let p = &priced.product;
        let directives = product_directives(priced, all_images);
        let mut view = Self {
            id: p.id.clone(),
            sku: p.sku.clone(),
            name: p.name.clone(),
            description: p.description.clone().filter(|d| !d.trim().is_empty()),
            category: p.category_name().map(str::to_string),
            in_stock: p.in_stock,
            stock_quantity: p.stock_quantity,
            tags: p.tags.clone(),
            price: None,
            currency: None,
            has_discount: None,
            discounted_price: None,
            discount_display: None,
            promotion_title: None,
            price_hidden: None,
            price_note: None,
            image: directives.first().map(DisplayDirective::token),
        };

        if price_visible {
            view.price = Some(p.price);
            view.currency = Some(p.currency.clone());
            view.has_discount = Some(priced.has_discount());
            if let Some(d) = &priced.discount {
                view.discounted_price = Some(d.discounted_price);
                view.discount_display = Some(d.discount_display.clone());
                view.promotion_title = Some(d.promotion_title.clone());
            }
        } else {
            view.price_hidden = Some(true);
            view.price_note = Some(PRICE_HIDDEN_MESSAGE);
        }
        view
    }
}

/// Directives for a product's images: the primary one, or all of them
pub fn product_directives(priced: &PricedProduct, all_images: bool) -> Vec<DisplayDirective> {
    let p = &priced.product;
    if all_images {
        p.images
            .iter()
            .filter(|u| !u.trim().is_empty())
            .enumerate()
            .map(|(i, url)| {
                let label = if i == 0 {
                    p.name.clone()
                } else {
                    format!("{} ({})", p.name, i + 1)
                };
                DisplayDirective::new(url.as_str(), label)
            })
            .collect()
    } else {
        p.primary_image()
            .map(|url| vec![DisplayDirective::new(url, p.name.as_str())])
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromotionView {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_display: Option<String>,
    pub applies_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl PromotionView {
    pub fn from_promotion(promo: &Promotion, price_visible: bool, currency: &str) -> Self {
        use crate::domain::PromotionScope;

        let applies_to = match &promo.scope {
            PromotionScope::All => "all products".to_string(),
            PromotionScope::Categories(c) => format!("categories: {}", c.join(", ")),
            PromotionScope::Products(ids) => format!("{} selected product(s)", ids.len()),
        };
        let mut view = Self {
            id: promo.id.clone(),
            title: promo.title.clone(),
            description: promo.description.clone().filter(|d| !d.trim().is_empty()),
            promo_code: promo.promo_code.clone().filter(|c| !c.trim().is_empty()),
            discount_type: None,
            discount_value: None,
            discount_display: None,
            applies_to,
            valid_until: promo.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
            price_hidden: None,
            image: promotion_directive(promo).map(|d| d.token()),
        };
        if price_visible {
            view.discount_type = Some(promo.discount_type);
            view.discount_value = Some(promo.discount_value);
            view.discount_display = Some(promo.discount_label(currency));
        } else {
            view.price_hidden = Some(true);
        }
        view
    }
}

pub fn promotion_directive(promo: &Promotion) -> Option<DisplayDirective> {
    promo
        .image_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .map(|url| DisplayDirective::new(url, promo.title.as_str()))
}
