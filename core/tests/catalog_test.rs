mod common;

use avatar_core::catalog::{apply_promotions, CatalogAccessor};
use avatar_core::domain::{DiscountType, PromotionScope};
use chrono::{Duration, TimeZone, Utc};
use common::{product, promo, seeded_store, AVATAR};

fn accessor(price_visible: bool) -> CatalogAccessor {
    CatalogAccessor::new(seeded_store(price_visible))
}

#[test]
fn promotion_activity_covers_flag_window_and_cap() {
    let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
    for flag in [true, false] {
        for in_window in [true, false] {
            for under_cap in [true, false] {
                let mut p = promo("p", DiscountType::Percentage, 10.0, PromotionScope::All);
                p.is_active = flag;
                if in_window {
                    p.start_date = Some(now - Duration::days(1));
                    p.end_date = Some(now + Duration::days(1));
                } else {
                    p.start_date = Some(now + Duration::days(1));
                    p.end_date = Some(now + Duration::days(2));
                }
                p.max_uses = Some(5);
                p.current_uses = if under_cap { 4 } else { 5 };
                assert_eq!(
                    p.is_active_at(now),
                    flag && in_window && under_cap,
                    "flag={flag} in_window={in_window} under_cap={under_cap}"
                );
            }
        }
    }
}

#[test]
fn promotion_window_bounds_are_inclusive() {
    let start = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 4, 30, 23, 59, 59).unwrap();
    let mut p = promo("p", DiscountType::FixedAmount, 5.0, PromotionScope::All);
    p.start_date = Some(start);
    p.end_date = Some(end);

    assert!(p.is_active_at(start));
    assert!(p.is_active_at(end));
    assert_eq!(p.inactive_reason(start - Duration::seconds(1)), Some("not started"));
    assert_eq!(p.inactive_reason(end + Duration::seconds(1)), Some("expired"));

    // open bounds are unbounded
    p.start_date = None;
    p.end_date = None;
    assert!(p.is_active_at(Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap()));
}

#[test]
fn category_promotion_beats_storewide_when_cheaper() {
    let promos = vec![
        promo("all", DiscountType::Percentage, 15.0, PromotionScope::All),
        promo(
            "cases",
            DiscountType::FixedAmount,
            20.0,
            PromotionScope::Categories(vec!["cases".into()]),
        ),
    ];
    let priced = apply_promotions(
        vec![
            product("p-1", "GS24", "Galaxy S24", "Phones", 3999.0, true),
            product("c-1", "CC-CLR", "Clear Case", "Cases", 49.0, true),
        ],
        &promos,
        Utc::now(),
    );

    let phone = priced[0].discount.as_ref().unwrap();
    assert_eq!(phone.promotion_id, "all");
    assert_eq!(phone.discounted_price, 3399.15);

    let case = priced[1].discount.as_ref().unwrap();
    assert_eq!(case.promotion_id, "cases");
    assert_eq!(case.discounted_price, 29.0);
}

#[tokio::test]
async fn browse_hides_out_of_stock_unless_asked() {
    let catalog = accessor(true);
    let in_stock = catalog.browse_catalog(AVATAR, false).await.unwrap();
    let names: Vec<&str> = in_stock.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Clear Case", "Galaxy S24"]);

    let everything = catalog.browse_catalog(AVATAR, true).await.unwrap();
    assert_eq!(everything.len(), 3);
    assert!(everything.iter().any(|p| p.name == "Pixel 8" && !p.in_stock));
}

#[tokio::test]
async fn categories_are_distinct_and_sorted() {
    let store = seeded_store(true);
    store
        .insert_product(product("c-2", "CC-BLK", "Black Case", " Cases ", 39.0, true))
        .unwrap();
    let mut blank = product("x-1", "MISC", "Gift Card", "", 50.0, true);
    blank.category = Some("   ".into());
    store.insert_product(blank).unwrap();

    let categories = CatalogAccessor::new(store).list_categories(AVATAR).await.unwrap();
    assert_eq!(categories, vec!["Cases", "Phones"]);
}

#[tokio::test]
async fn search_matches_name_and_sku_case_insensitively() {
    let catalog = accessor(true);
    let by_name = catalog.search_products(AVATAR, "galaxy", 10).await.unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].id, "p-1");

    let by_sku = catalog.search_products(AVATAR, "px8", 10).await.unwrap();
    assert_eq!(by_sku[0].id, "p-2");

    assert!(catalog.search_products(AVATAR, "   ", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn products_by_category_respects_limit() {
    let catalog = accessor(true);
    let phones = catalog
        .get_products_by_category(AVATAR, "phones", 10)
        .await
        .unwrap();
    assert_eq!(phones.len(), 2);

    let one = catalog.get_products_by_category(AVATAR, "Phones", 1).await.unwrap();
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn active_promotions_exclude_exhausted_ones() {
    let catalog = accessor(true);
    let active = catalog
        .get_active_promotions(AVATAR, 10, Utc::now())
        .await
        .unwrap();
    let ids: Vec<&str> = active.iter().map(|p| p.id.as_str()).collect();
    assert!(ids.contains(&"raya"));
    assert!(ids.contains(&"case20"));
    assert!(!ids.contains(&"save10"));
}

#[tokio::test]
async fn promo_code_validation_reports_reasons() {
    let catalog = accessor(true);
    let now = Utc::now();

    let ok = catalog.validate_promo_code(AVATAR, " raya ", now).await.unwrap();
    assert!(ok.valid);
    assert_eq!(ok.promotion.unwrap().id, "raya");

    let used_up = catalog.validate_promo_code(AVATAR, "SAVE10", now).await.unwrap();
    assert!(!used_up.valid);
    assert_eq!(used_up.reason.as_deref(), Some("max uses reached"));

    let missing = catalog.validate_promo_code(AVATAR, "NOPE", now).await.unwrap();
    assert!(!missing.valid);
    assert_eq!(missing.reason.as_deref(), Some("code not found"));
    assert!(missing.promotion.is_none());
}

#[tokio::test]
async fn pricing_attaches_best_discount() {
    let catalog = accessor(true);
    let products = catalog.browse_catalog(AVATAR, false).await.unwrap();
    let priced = catalog.price(AVATAR, products, Utc::now()).await.unwrap();

    let case = priced.iter().find(|p| p.product.id == "c-1").unwrap();
    assert_eq!(case.discount.as_ref().unwrap().promotion_id, "case20");
    let phone = priced.iter().find(|p| p.product.id == "p-1").unwrap();
    assert_eq!(phone.discount.as_ref().unwrap().promotion_id, "raya");
}

#[test]
fn duplicate_sku_is_rejected() {
    let store = seeded_store(true);
    let err = store
        .insert_product(product("p-9", "gs24", "Galaxy Copy", "Phones", 1.0, true))
        .unwrap_err();
    assert!(err.to_string().contains("duplicate sku"));
}
