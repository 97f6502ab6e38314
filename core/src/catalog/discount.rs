use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Product, Promotion};

/// The winning promotion for one product
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppliedDiscount {
    pub promotion_id: String,
    pub promotion_title: String,
    pub discounted_price: f64,
    pub discount_display: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedProduct {
    pub product: Product,
    pub discount: Option<AppliedDiscount>,
}

impl PricedProduct {
    pub fn has_discount(&self) -> bool {
        self.discount.is_some()
    }
}

/// Attach the best currently-active promotion to each product.
///
/// Candidates are promotions active at `now` whose scope covers the product and
/// that actually lower the price. The lowest resulting price wins; on a tie the
/// first promotion in `promotions` order is kept.
pub fn apply_promotions(
    products: Vec<Product>,
    promotions: &[Promotion],
    now: DateTime<Utc>,
) -> Vec<PricedProduct> {
    let active: Vec<&Promotion> = promotions.iter().filter(|p| p.is_active_at(now)).collect();

    products
        .into_iter()
        .map(|product| {
            let mut best: Option<(&Promotion, f64)> = None;
            for promo in active.iter().copied().filter(|p| p.scope.covers(&product)) {
                let price = promo.discounted(product.price);
                if round_cents(price) >= product.price {
                    continue;
                }
                if best.map_or(true, |(_, best_price)| price < best_price) {
                    best = Some((promo, price));
                }
            }
            let discount = best.map(|(promo, price)| AppliedDiscount {
                promotion_id: promo.id.clone(),
                promotion_title: promo.title.clone(),
                discounted_price: round_cents(price),
                discount_display: promo.discount_label(&product.currency),
            });
            PricedProduct { product, discount }
        })
        .collect()
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DiscountType, PromotionScope};
    use chrono::Duration;

    fn product(id: &str, category: &str, price: f64) -> Product {
        Product {
            id: id.into(),
            chatbot_id: "c1".into(),
            sku: id.to_uppercase(),
            name: format!("Item {id}"),
            description: None,
            price,
            currency: "MYR".into(),
            category: Some(category.into()),
            in_stock: true,
            stock_quantity: None,
            images: vec![],
            tags: vec![],
        }
    }

    fn promo(id: &str, kind: DiscountType, value: f64, scope: PromotionScope) -> Promotion {
        Promotion {
            id: id.into(),
            chatbot_id: "c1".into(),
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

    #[test]
    fn lowest_resulting_price_wins() {
        let now = Utc::now();
        let promos = vec![
            promo("pct", DiscountType::Percentage, 10.0, PromotionScope::All),
            promo("fixed", DiscountType::FixedAmount, 30.0, PromotionScope::All),
        ];
        let priced = apply_promotions(vec![product("a", "Phones", 200.0)], &promos, now);
        let d = priced[0].discount.as_ref().unwrap();
        assert_eq!(d.promotion_id, "fixed");
        assert_eq!(d.discounted_price, 170.0);
        assert_eq!(d.discount_display, "MYR 30.00 off");
    }

    #[test]
    fn ties_keep_first_seen() {
        let now = Utc::now();
        let promos = vec![
            promo("first", DiscountType::Percentage, 50.0, PromotionScope::All),
            promo("second", DiscountType::FixedAmount, 50.0, PromotionScope::All),
        ];
        let priced = apply_promotions(vec![product("a", "Phones", 100.0)], &promos, now);
        assert_eq!(priced[0].discount.as_ref().unwrap().promotion_id, "first");
    }

    #[test]
    fn sub_cent_difference_still_picks_cheaper() {
        let now = Utc::now();
        let promos = vec![
            promo("worse", DiscountType::Percentage, 10.001, PromotionScope::All),
            promo("better", DiscountType::Percentage, 10.004, PromotionScope::All),
        ];
        let priced = apply_promotions(vec![product("a", "Phones", 100.0)], &promos, now);
        let d = priced[0].discount.as_ref().unwrap();
        assert_eq!(d.promotion_id, "better");
        assert_eq!(d.discounted_price, 90.0);
    }

    #[test]
    fn scope_and_activity_are_respected() {
        let now = Utc::now();
        let mut expired = promo("old", DiscountType::Percentage, 90.0, PromotionScope::All);
        expired.end_date = Some(now - Duration::days(1));
        let promos = vec![
            expired,
            promo(
                "cases",
                DiscountType::Percentage,
                20.0,
                PromotionScope::Categories(vec!["Cases".into()]),
            ),
            promo(
                "only-b",
                DiscountType::FixedAmount,
                1.0,
                PromotionScope::Products(vec!["b".into()]),
            ),
        ];
        let priced = apply_promotions(
            vec![product("a", "Phones", 100.0), product("b", "Cases", 10.0)],
            &promos,
            now,
        );
        assert!(!priced[0].has_discount());
        let b = priced[1].discount.as_ref().unwrap();
        assert_eq!(b.promotion_id, "cases");
        assert_eq!(b.discounted_price, 8.0);
    }

    #[test]
    fn zero_value_promotions_are_not_discounts() {
        let promos = vec![promo("zero", DiscountType::FixedAmount, 0.0, PromotionScope::All)];
        let priced = apply_promotions(vec![product("a", "Phones", 100.0)], &promos, Utc::now());
        assert!(!priced[0].has_discount());
    }
}
