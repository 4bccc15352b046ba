//! Server-side cart pricing ahead of order placement.

use axum::{extract::State, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ValidatedJson;
use crate::auth::CurrentUser;
use crate::domain::aggregates::{Cart, CartItem, LineItem, VariantSelection};
use crate::domain::role::Permission;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::CatalogStore;

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/checkout/quote", post(quote))
}

#[derive(Debug, Deserialize, Validate)]
struct QuoteRequest {
    #[validate]
    items: Vec<QuoteLine>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct QuoteLine {
    #[validate(length(min = 1))]
    slug: String,
    #[serde(flatten)]
    selection: VariantSelection,
    #[validate(range(min = 1, max = 100))]
    quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    items: Vec<CartItem>,
    /// Ready-made `items` for `POST /orders`.
    line_items: Vec<LineItem>,
    subtotal: Decimal,
    available: bool,
}

/// Prices every line from the catalog. Identical lines are merged.
async fn quote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(body): ValidatedJson<QuoteRequest>,
) -> Result<Json<Quote>> {
    user.require(Permission::CheckoutQuote)?;
    if body.items.is_empty() {
        return Err(AppError::Validation("items must not be empty".into()));
    }

    let mut cart = Cart::new();
    for line in body.items {
        let product = state
            .store()
            .product_by_slug(&line.slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {} not found", line.slug)))?;
        cart.add_item(CartItem::priced(&product, line.selection, line.quantity)?)?;
    }

    Ok(Json(Quote {
        line_items: cart.line_items(),
        subtotal: cart.subtotal(),
        available: cart.is_fully_available(),
        items: cart.items().to_vec(),
    }))
}
