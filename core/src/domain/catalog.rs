use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::de;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("percentage discount must be at most 100 (got {0})")]
    PercentageOverHundred(f64),

    #[error("promotion window ends before it starts")]
    InvertedWindow,
}

/// A catalog item owned by one chatbot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub chatbot_id: String,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "de::number_or_string")]
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "de::default_true", deserialize_with = "de::bool_default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default, alias = "image_urls", deserialize_with = "de::string_or_list")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "de::string_or_list")]
    pub tags: Vec<String>,
}

fn default_currency() -> String {
    "MYR".to_string()
}

impl Product {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sku.trim().is_empty() {
            return Err(ValidationError::Empty { field: "sku" });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        if self.price < 0.0 || self.price.is_nan() {
            return Err(ValidationError::Negative {
                field: "price",
                value: self.price,
            });
        }
        Ok(())
    }

    /// Category with surrounding whitespace removed; blank counts as none
    pub fn category_name(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.images.iter().map(String::as_str).find(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
}

/// Which products a promotion applies to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "applies_to", content = "targets", rename_all = "snake_case")]
pub enum PromotionScope {
    #[default]
    All,
    Categories(Vec<String>),
    Products(Vec<String>),
}

impl PromotionScope {
    pub fn covers(&self, product: &Product) -> bool {
        match self {
            PromotionScope::All => true,
            PromotionScope::Categories(categories) => product
                .category_name()
                .map(|c| categories.iter().any(|x| x.trim().eq_ignore_ascii_case(c)))
                .unwrap_or(false),
            PromotionScope::Products(ids) => ids.iter().any(|id| id == &product.id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promotion {
    pub id: String,
    pub chatbot_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub promo_code: Option<String>,
    pub discount_type: DiscountType,
    #[serde(deserialize_with = "de::number_or_string")]
    pub discount_value: f64,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "de::default_true", deserialize_with = "de::bool_default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub current_uses: i64,
    #[serde(default)]
    pub max_uses: Option<i64>,
    #[serde(default)]
    pub scope: PromotionScope,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Promotion {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        if self.discount_value < 0.0 || self.discount_value.is_nan() {
            return Err(ValidationError::Negative {
                field: "discount_value",
                value: self.discount_value,
            });
        }
        if self.discount_type == DiscountType::Percentage && self.discount_value > 100.0 {
            return Err(ValidationError::PercentageOverHundred(self.discount_value));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ValidationError::InvertedWindow);
            }
        }
        Ok(())
    }

    /// Why the promotion cannot be used at `now`, or `None` when it is active.
    ///
    /// Active iff the flag is set, `now` lies in `[start_date, end_date]` (open
    /// bounds unbounded) and the usage cap, if any, is not reached.
    pub fn inactive_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.is_active {
            return Some("inactive");
        }
        if self.start_date.is_some_and(|start| now < start) {
            return Some("not started");
        }
        if self.end_date.is_some_and(|end| now > end) {
            return Some("expired");
        }
        if self.max_uses.is_some_and(|max| self.current_uses >= max) {
            return Some("max uses reached");
        }
        None
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.inactive_reason(now).is_none()
    }

    /// Price after applying this promotion to `price`
    pub fn discounted(&self, price: f64) -> f64 {
        match self.discount_type {
            DiscountType::Percentage => price * (1.0 - self.discount_value / 100.0),
            DiscountType::FixedAmount => (price - self.discount_value).max(0.0),
        }
    }

    /// Short label such as "15% off" or "MYR 5.00 off"
    pub fn discount_label(&self, currency: &str) -> String {
        match self.discount_type {
            DiscountType::Percentage => format!("{}% off", trim_number(self.discount_value)),
            DiscountType::FixedAmount => format!("{currency} {:.2} off", self.discount_value),
        }
    }
}

fn trim_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v:.2}")
    }
}
