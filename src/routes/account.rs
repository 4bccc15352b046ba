//! The signed-in shopper's own profile and order history.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use super::ListParams;
use crate::auth::CurrentUser;
use crate::domain::aggregates::{Account, Order};
use crate::domain::role::Permission;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{AccountStore, OrderStore};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/account", get(profile))
        .route("/account/orders", get(my_orders))
}

async fn profile(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Account>> {
    user.require(Permission::ProfileRead)?;
    let account = state.store().account_by_id(user.sub).await?.ok_or_else(|| AppError::not_found("account"))?;
    Ok(Json(account))
}

/// Orders placed while signed in, plus guest orders under the same email.
async fn my_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Order>>> {
    user.require(Permission::OrdersReadOwn)?;
    let orders = state.store().orders_for_customer(user.sub, &user.email, params.page()).await?;
    Ok(Json(orders))
}
