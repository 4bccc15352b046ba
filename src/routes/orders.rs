//! Order placement and back-office order management.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{PaginatedResponse, ValidatedJson, IDEMPOTENCY_KEY};
use crate::auth::{CurrentUser, OptionalUser};
use crate::domain::aggregates::order::storable_amount;
use crate::domain::aggregates::{Checkout, Customer, LineItem, Order, OrderStatus, PaymentStatus};
use crate::domain::role::Permission;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{OrderStore, Page, StoreError};

/// Attempts at drawing an unused order number.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/payment", patch(update_payment))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderRequest {
    #[validate]
    customer: Customer,
    #[validate]
    items: Vec<LineItem>,
    #[validate(custom = "storable_amount")]
    total: Decimal,
    #[serde(default)]
    #[validate(length(max = 1000))]
    note: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    id: Uuid,
    order_number: String,
}

impl From<&Order> for PlacedOrder {
    fn from(order: &Order) -> Self {
        Self { id: order.id(), order_number: order.order_number().to_string() }
    }
}

/// Places an order for a guest or signed-in shopper.
///
/// With an `Idempotency-Key` header a repeated submission returns the order
/// created the first time (200) instead of placing a second one.
async fn place_order(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>)> {
    if let Some(user) = &user {
        user.require(Permission::OrdersCreate)?;
    }
    let idempotency_key = match headers.get(IDEMPOTENCY_KEY) {
        Some(value) => {
            let key = value.to_str().map_err(|_| AppError::Validation("invalid Idempotency-Key header".into()))?.trim();
            (!key.is_empty()).then(|| key.to_string())
        }
        None => None,
    };

    let store = state.store();
    if let Some(key) = &idempotency_key {
        if let Some(existing) = store.order_by_idempotency_key(key).await? {
            tracing::info!(order_id = %existing.id(), "Replayed order submission");
            return Ok((StatusCode::OK, Json(PlacedOrder::from(&existing))));
        }
    }

    let checkout = Checkout {
        customer: body.customer,
        items: body.items,
        client_total: body.total,
        user_id: user.map(|u| u.sub),
        idempotency_key,
        note: body.note,
    };

    let mut attempt = 0;
    let mut order = loop {
        let order = Order::place(checkout.clone())?;
        match store.insert_order(&order).await {
            Ok(()) => break order,
            Err(StoreError::Duplicate("order_number")) if attempt + 1 < ORDER_NUMBER_ATTEMPTS => attempt += 1,
            // Lost a race with a concurrent submission carrying the same key.
            Err(StoreError::Duplicate("idempotency_key")) => {
                let key = order.idempotency_key().unwrap_or_default();
                let existing = store
                    .order_by_idempotency_key(key)
                    .await?
                    .ok_or_else(|| AppError::Conflict("duplicate idempotency key".into()))?;
                return Ok((StatusCode::OK, Json(PlacedOrder::from(&existing))));
            }
            Err(e) => return Err(e.into()),
        }
    };

    state.publish(order.take_events()).await;
    tracing::info!(order_id = %order.id(), order_number = order.order_number(), total = %order.total(), "Order placed");
    Ok((StatusCode::CREATED, Json(PlacedOrder::from(&order))))
}

#[derive(Debug, Deserialize)]
struct OrderFilter {
    page: Option<u32>,
    per_page: Option<u32>,
    status: Option<String>,
}

async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<PaginatedResponse<Order>>> {
    user.require(Permission::OrdersReadAll)?;
    let status = filter
        .status
        .as_deref()
        .map(|s| OrderStatus::parse(s).ok_or_else(|| AppError::Validation(format!("unknown order status: {s}"))))
        .transpose()?;

    let page = Page::new(filter.page, filter.per_page);
    let (orders, total) = state.store().list_orders(status, page).await?;
    Ok(Json(PaginatedResponse::new(orders, total, page)))
}

/// Staff see every order; shoppers only their own. Someone else's order is
/// reported as missing.
async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    let order = state.store().order_by_id(id).await?.ok_or_else(|| AppError::not_found("order"))?;

    let owns = order.user_id() == Some(user.sub) || order.customer().email.eq_ignore_ascii_case(&user.email);
    if user.allows(Permission::OrdersReadAll) || (owns && user.allows(Permission::OrdersReadOwn)) {
        Ok(Json(order))
    } else {
        Err(AppError::not_found("order"))
    }
}

#[derive(Debug, Deserialize, Validate)]
struct StatusUpdate {
    status: OrderStatus,
}

async fn update_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<StatusUpdate>,
) -> Result<Json<Order>> {
    user.require(Permission::OrdersManage)?;
    let store = state.store();
    let mut order = store.order_by_id(id).await?.ok_or_else(|| AppError::not_found("order"))?;

    order.update_status(body.status)?;
    if !store.update_order(&order).await? {
        return Err(AppError::not_found("order"));
    }
    state.publish(order.take_events()).await;

    tracing::info!(order_id = %id, status = order.status().as_str(), "Order status changed");
    Ok(Json(order))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct PaymentUpdate {
    payment_status: PaymentStatus,
}

async fn update_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<PaymentUpdate>,
) -> Result<Json<Order>> {
    user.require(Permission::OrdersManage)?;
    let store = state.store();
    let mut order = store.order_by_id(id).await?.ok_or_else(|| AppError::not_found("order"))?;

    order.update_payment(body.payment_status)?;
    if !store.update_order(&order).await? {
        return Err(AppError::not_found("order"));
    }
    state.publish(order.take_events()).await;

    tracing::info!(order_id = %id, payment_status = order.payment_status().as_str(), "Payment status changed");
    Ok(Json(order))
}
