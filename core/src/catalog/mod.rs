//! Catalog Accessor: product and promotion reads with discount resolution,
//! price-visibility redaction and image display directives.

mod accessor;
mod directive;
mod discount;
mod view;

pub use accessor::{CatalogAccessor, PromoValidation};
pub use directive::{extract_directives, render_reply, DisplayDirective};
pub use discount::{apply_promotions, AppliedDiscount, PricedProduct};
pub use view::{
    product_directives, promotion_directive, ProductView, PromotionView, PRICE_HIDDEN_MESSAGE,
};
