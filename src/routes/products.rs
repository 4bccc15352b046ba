//! Catalog routes: public browsing, admin editing, stock and back-in-stock
//! subscriptions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ListParams, ValidatedJson};
use crate::auth::CurrentUser;
use crate::domain::aggregates::notification::back_in_stock;
use crate::domain::aggregates::{
    ColorVariant, DetailRow, PreOrderConfig, Product, ProductSpec, ProductStatus, RegionVariant, StockNotification,
    StorageVariant,
};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::role::Permission;
use crate::domain::value_objects::{slugify, Sku, Slug};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{CatalogStore, NotificationStore, Store, StoreError};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/by-slug/:slug", get(get_by_slug))
        .route("/products/:key", get(list_by_category).put(update_product).delete(delete_product))
        .route("/products/:key/notify", post(subscribe))
        .route("/products/:key/stock", patch(set_stock))
}

/// Create/replace payload. `productlinkname` is the storefront's older name
/// for `slug`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default, alias = "productlinkname")]
    pub slug: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub base_price: Decimal,
    #[serde(default)]
    pub color_variants: Vec<ColorVariant>,
    #[serde(default)]
    pub storage_variants: Vec<StorageVariant>,
    #[serde(default)]
    pub region_variants: Vec<RegionVariant>,
    #[serde(default)]
    pub details: Vec<DetailRow>,
    #[serde(default)]
    pub pre_order_config: PreOrderConfig,
    #[serde(default)]
    pub stock_quantity: Option<i32>,
    #[serde(default)]
    pub status: ProductStatus,
}

impl ProductInput {
    fn explicit_slug(&self) -> Option<&str> {
        self.slug.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn explicit_sku(&self) -> Option<&str> {
        self.sku.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn into_spec(self) -> ProductSpec {
        ProductSpec {
            name: self.name,
            category: self.category,
            description: self.description,
            base_price: self.base_price,
            color_variants: self.color_variants,
            storage_variants: self.storage_variants,
            region_variants: self.region_variants,
            details: self.details,
            pre_order_config: self.pre_order_config,
            stock_quantity: self.stock_quantity.unwrap_or(0),
            status: self.status,
        }
    }
}

/// Attempts at a derived slug before a concurrent creator wins outright.
const SLUG_ATTEMPTS: usize = 5;

/// Product as the storefront reads it: the stored fields plus the slug again
/// under its older `productlinkname` key.
#[derive(Debug, Serialize)]
struct ProductView {
    productlinkname: Slug,
    #[serde(flatten)]
    product: Product,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self { productlinkname: product.slug.clone(), product }
    }
}

#[derive(Debug, Serialize)]
struct CreatedProduct {
    id: Uuid,
    productlinkname: Slug,
    slug: Slug,
}

async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(input): ValidatedJson<ProductInput>,
) -> Result<(StatusCode, Json<CreatedProduct>)> {
    user.require(Permission::CatalogWrite)?;

    let sku = input.explicit_sku().map(Sku::new).transpose()?.unwrap_or_else(Sku::generate);
    let mut product = match input.explicit_slug() {
        // Explicit slugs are taken as-is; a collision surfaces as 409.
        Some(explicit) => {
            let product = Product::create(sku, Slug::parse(explicit)?, input.into_spec())?;
            state.store().insert_product(&product).await?;
            product
        }
        None => {
            let base = Slug::from_name(&input.name)?;
            insert_with_derived_slug(state.store(), sku, base, input.into_spec()).await?
        }
    };
    state.publish(product.take_events()).await;

    tracing::info!(product_id = %product.id, sku = %product.sku, slug = %product.slug, "Product created");
    let created = CreatedProduct { id: product.id, productlinkname: product.slug.clone(), slug: product.slug };
    Ok((StatusCode::CREATED, Json(created)))
}

/// Inserts under the first free disambiguation of `base`. Another request
/// can claim the same slug between the lookup and the insert, so a slug
/// collision picks the next free one.
async fn insert_with_derived_slug<S>(store: &S, sku: Sku, base: Slug, spec: ProductSpec) -> Result<Product>
where
    S: CatalogStore + ?Sized,
{
    let mut attempt = 1;
    loop {
        let slug = free_slug(store, base.clone()).await?;
        let product = Product::create(sku.clone(), slug, spec.clone())?;
        match store.insert_product(&product).await {
            Ok(()) => return Ok(product),
            Err(StoreError::Duplicate("slug")) if attempt < SLUG_ATTEMPTS => {
                tracing::debug!(slug = %product.slug, attempt, "Derived slug claimed concurrently, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// First of `base`, `base-2`, `base-3`, ... not already in the catalog.
async fn free_slug<S>(store: &S, base: Slug) -> Result<Slug>
where
    S: CatalogStore + ?Sized,
{
    if !store.slug_taken(base.as_str()).await? {
        return Ok(base);
    }
    let mut n = 2;
    loop {
        let candidate = base.with_suffix(n);
        if !store.slug_taken(candidate.as_str()).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

async fn list_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ProductView>>> {
    let products = state.store().products_by_category(category.trim(), params.page()).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

#[derive(Debug, Deserialize)]
struct SlugLookup {
    name: Option<String>,
}

/// Looks the product up by slug, falling back to the slug of `?name=` for
/// links built before the product had one.
async fn get_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(lookup): Query<SlugLookup>,
) -> Result<Json<ProductView>> {
    let store = state.store();
    if let Some(product) = store.product_by_slug(&slug).await? {
        return Ok(Json(product.into()));
    }

    let fallback = lookup.name.as_deref().map(slugify).filter(|s| !s.is_empty() && *s != slug);
    if let Some(fallback) = fallback {
        if let Some(product) = store.product_by_slug(&fallback).await? {
            return Ok(Json(product.into()));
        }
    }
    Err(AppError::not_found("product"))
}

async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<ProductInput>,
) -> Result<Json<ProductView>> {
    user.require(Permission::CatalogWrite)?;
    let store = state.store();
    let mut product = store.product_by_id(id).await?.ok_or_else(|| AppError::not_found("product"))?;

    if let Some(sku) = input.explicit_sku() {
        product.sku = Sku::new(sku)?;
    }
    if let Some(slug) = input.explicit_slug() {
        let slug = Slug::parse(slug)?;
        if slug != product.slug {
            product.rename_slug(slug);
        }
    }
    let stock = input.stock_quantity;
    product.apply(input.into_spec())?;
    let restocked = match stock {
        Some(quantity) if quantity != product.stock_quantity => product.set_stock(quantity)?,
        _ => false,
    };

    if !store.update_product(&product).await? {
        return Err(AppError::not_found("product"));
    }
    let mut events = product.take_events();
    if restocked {
        notify_subscribers(store, &product, &mut events).await?;
    }
    state.publish(events).await;

    tracing::info!(product_id = %product.id, "Product updated");
    Ok(Json(product.into()))
}

#[derive(Debug, Serialize)]
struct DeletedProduct {
    id: Uuid,
    deleted: bool,
}

async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedProduct>> {
    user.require(Permission::CatalogWrite)?;
    if !state.store().delete_product(id).await? {
        return Err(AppError::not_found("product"));
    }
    state.publish(vec![DomainEvent::Product(ProductEvent::Deleted { product_id: id })]).await;

    tracing::info!(product_id = %id, "Product deleted");
    Ok(Json(DeletedProduct { id, deleted: true }))
}

#[derive(Debug, Deserialize, Validate)]
struct SubscribeRequest {
    #[validate(email)]
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    product_id: Uuid,
    email: String,
    created: bool,
}

async fn subscribe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<SubscribeRequest>,
) -> Result<(StatusCode, Json<Subscription>)> {
    let store = state.store();
    if store.product_by_id(id).await?.is_none() {
        return Err(AppError::not_found("product"));
    }

    let notification = StockNotification::subscribe(id, &body.email);
    let created = store.subscribe(&notification).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(Subscription { product_id: id, email: notification.email, created })))
}

#[derive(Debug, Deserialize, Validate)]
struct StockRequest {
    #[validate(range(min = 0))]
    quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StockLevel {
    id: Uuid,
    stock_quantity: i32,
    notified: usize,
}

async fn set_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<StockRequest>,
) -> Result<Json<StockLevel>> {
    user.require(Permission::CatalogStock)?;
    let store = state.store();
    let mut product = store.product_by_id(id).await?.ok_or_else(|| AppError::not_found("product"))?;

    let restocked = product.set_stock(body.quantity)?;
    if !store.update_product(&product).await? {
        return Err(AppError::not_found("product"));
    }

    let mut events = product.take_events();
    let notified = if restocked { notify_subscribers(store, &product, &mut events).await? } else { 0 };
    state.publish(events).await;

    tracing::info!(product_id = %id, quantity = body.quantity, notified, "Stock updated");
    Ok(Json(StockLevel { id, stock_quantity: product.stock_quantity, notified }))
}

/// Drains pending subscriptions into a `BackInStock` event for the mailer.
/// Returns how many subscribers were waiting.
async fn notify_subscribers(store: &dyn Store, product: &Product, events: &mut Vec<DomainEvent>) -> Result<usize> {
    let drained = store.drain_pending(product.id).await?;
    if !drained.is_empty() {
        tracing::info!(product_id = %product.id, subscribers = drained.len(), "Product back in stock");
        events.push(back_in_stock(product, &drained));
    }
    Ok(drained.len())
}
