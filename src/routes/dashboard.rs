//! Back-office dashboard API.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ListParams, PaginatedResponse, ValidatedJson};
use crate::auth::CurrentUser;
use crate::domain::aggregates::{Account, OrderStatus};
use crate::domain::role::{Permission, Role};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{AccountStore, CatalogStore, OrderStore};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/summary", get(summary))
        .route("/dashboard/users", get(list_users))
        .route("/dashboard/users/:id/role", patch(change_role))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    products: i64,
    orders: i64,
    pending_orders: i64,
}

async fn summary(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Summary>> {
    user.require(Permission::DashboardView)?;
    let store = state.store();

    let products = store.count_products().await?;
    let orders = store.count_orders(None).await?;
    let pending_orders = store.count_orders(Some(OrderStatus::Pending)).await?;
    Ok(Json(Summary { products, orders, pending_orders }))
}

async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Account>>> {
    user.require(Permission::UsersRead)?;
    let page = params.page();
    let (accounts, total) = state.store().list_accounts(page).await?;
    Ok(Json(PaginatedResponse::new(accounts, total, page)))
}

#[derive(Debug, Deserialize, Validate)]
struct RoleChange {
    role: Role,
}

async fn change_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<RoleChange>,
) -> Result<Json<Account>> {
    user.require(Permission::UsersManageRoles)?;
    let store = state.store();
    let mut account = store.account_by_id(id).await?.ok_or_else(|| AppError::not_found("account"))?;

    account.change_role(body.role);
    if !store.update_account(&account).await? {
        return Err(AppError::not_found("account"));
    }
    state.publish(account.take_events()).await;

    tracing::info!(account_id = %id, role = %body.role, changed_by = %user.sub, "Role changed");
    Ok(Json(account))
}
