//! Postgres-backed store.
//!
//! Unique-constraint violations are mapped to [`StoreError::Duplicate`] by
//! constraint name; everything else surfaces as [`StoreError::Database`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{AccountStore, CatalogStore, NotificationStore, OrderStore, Page, StoreError};
use crate::domain::aggregates::{
    Account, ColorVariant, Customer, DetailRow, LineItem, Order, OrderParts, OrderStatus, PaymentStatus,
    PendingVerification, PreOrderConfig, Product, ProductStatus, RegionVariant, StockNotification, StorageVariant,
};
use crate::domain::role::Role;
use crate::domain::value_objects::{Sku, Slug};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds the process-wide pool without opening a connection. The first
    /// query pays the connection cost; dropped connections are re-established
    /// by the pool on the next acquire.
    pub fn connect_lazy(database_url: &SecretString, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url.expose_secret())?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn count_orders_with(&self, status: Option<&str>) -> Result<i64, StoreError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("products_sku_key") => "sku",
                Some("products_slug_key") => "slug",
                Some("orders_order_number_key") => "order_number",
                Some("orders_idempotency_key_key") => "idempotency_key",
                Some("accounts_email_key") => "email",
                _ => "key",
            };
            return StoreError::Duplicate(field);
        }
    }
    StoreError::Database(e)
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    slug: String,
    category: String,
    description: Option<String>,
    base_price: Decimal,
    color_variants: Json<Vec<ColorVariant>>,
    storage_variants: Json<Vec<StorageVariant>>,
    region_variants: Json<Vec<RegionVariant>>,
    details: Json<Vec<DetailRow>>,
    pre_order_config: Json<PreOrderConfig>,
    stock_quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: r.id,
            sku: Sku::new(&r.sku).map_err(|e| StoreError::Corrupt(format!("product {} sku: {e}", r.id)))?,
            name: r.name,
            slug: Slug::parse(&r.slug).map_err(|e| StoreError::Corrupt(format!("product {} slug: {e}", r.id)))?,
            category: r.category,
            description: r.description,
            base_price: r.base_price,
            color_variants: r.color_variants.0,
            storage_variants: r.storage_variants.0,
            region_variants: r.region_variants.0,
            details: r.details.0,
            pre_order_config: r.pre_order_config.0,
            stock_quantity: r.stock_quantity,
            status: ProductStatus::parse(&r.status)
                .ok_or_else(|| StoreError::Corrupt(format!("product {} status {:?}", r.id, r.status)))?,
            created_at: r.created_at,
            updated_at: r.updated_at,
            events: Vec::new(),
        })
    }
}

fn products(rows: Vec<ProductRow>) -> Result<Vec<Product>, StoreError> {
    rows.into_iter().map(Product::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    customer: Json<Customer>,
    items: Json<Vec<LineItem>>,
    total: Decimal,
    status: String,
    payment_status: String,
    idempotency_key: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&r.status)
            .ok_or_else(|| StoreError::Corrupt(format!("order {} status {:?}", r.id, r.status)))?;
        let payment_status = PaymentStatus::parse(&r.payment_status)
            .ok_or_else(|| StoreError::Corrupt(format!("order {} payment status {:?}", r.id, r.payment_status)))?;
        Ok(Order::restore(OrderParts {
            id: r.id,
            order_number: r.order_number,
            user_id: r.user_id,
            customer: r.customer.0,
            items: r.items.0,
            total: r.total,
            status,
            payment_status,
            idempotency_key: r.idempotency_key,
            note: r.note,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }))
    }
}

fn orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
    rows.into_iter().map(Order::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    provider: String,
    is_verified: bool,
    verification_token_hash: Option<String>,
    verification_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(r: AccountRow) -> Result<Self, Self::Error> {
        let role = r.role.parse::<Role>().map_err(|e| StoreError::Corrupt(format!("account {}: {e}", r.id)))?;
        let verification = match (r.verification_token_hash, r.verification_expires_at) {
            (Some(token_hash), Some(expires_at)) => Some(PendingVerification { token_hash, expires_at }),
            _ => None,
        };
        Ok(Account {
            id: r.id,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            role,
            provider: r.provider,
            is_verified: r.is_verified,
            verification,
            created_at: r.created_at,
            updated_at: r.updated_at,
            events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    product_id: Uuid,
    email: String,
    created_at: DateTime<Utc>,
    notified_at: Option<DateTime<Utc>>,
}

impl From<NotificationRow> for StockNotification {
    fn from(r: NotificationRow) -> Self {
        Self { id: r.id, product_id: r.product_id, email: r.email, created_at: r.created_at, notified_at: r.notified_at }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    #[instrument(skip(self, product), fields(product_id = %product.id, slug = %product.slug))]
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, sku, name, slug, category, description, base_price, color_variants, storage_variants, region_variants, details, pre_order_config, stock_quantity, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(product.id).bind(product.sku.as_str()).bind(&product.name).bind(product.slug.as_str())
        .bind(&product.category).bind(&product.description).bind(product.base_price)
        .bind(Json(&product.color_variants)).bind(Json(&product.storage_variants))
        .bind(Json(&product.region_variants)).bind(Json(&product.details)).bind(Json(&product.pre_order_config))
        .bind(product.stock_quantity).bind(product.status.as_str()).bind(product.created_at).bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError> {
        let (taken,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM products WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn products_by_category(&self, category: &str, page: Page) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE category = lower($1) AND status = 'active' ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(category).bind(page.limit()).bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        products(rows)
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn update_product(&self, product: &Product) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE products SET sku = $2, name = $3, slug = $4, category = $5, description = $6, base_price = $7, color_variants = $8, storage_variants = $9, region_variants = $10, details = $11, pre_order_config = $12, stock_quantity = $13, status = $14, updated_at = $15 WHERE id = $1",
        )
        .bind(product.id).bind(product.sku.as_str()).bind(&product.name).bind(product.slug.as_str())
        .bind(&product.category).bind(&product.description).bind(product.base_price)
        .bind(Json(&product.color_variants)).bind(Json(&product.storage_variants))
        .bind(Json(&product.region_variants)).bind(Json(&product.details)).bind(Json(&product.pre_order_config))
        .bind(product.stock_quantity).bind(product.status.as_str()).bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products").fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self, order), fields(order_number = %order.order_number()))]
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, customer, customer_email, items, total, status, payment_status, idempotency_key, note, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id()).bind(order.order_number()).bind(order.user_id())
        .bind(Json(order.customer())).bind(&order.customer().email).bind(Json(order.items()))
        .bind(order.total()).bind(order.status().as_str()).bind(order.payment_status().as_str())
        .bind(order.idempotency_key()).bind(order.note()).bind(order.created_at()).bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: Page) -> Result<(Vec<Order>, i64), StoreError> {
        let status = status.map(OrderStatus::as_str);
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(status).bind(page.limit()).bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((orders(rows)?, self.count_orders_with(status).await?))
    }

    async fn count_orders(&self, status: Option<OrderStatus>) -> Result<i64, StoreError> {
        self.count_orders_with(status.map(OrderStatus::as_str)).await
    }

    async fn orders_for_customer(&self, user_id: Uuid, email: &str, page: Page) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 OR lower(customer_email) = lower($2) ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(user_id).bind(email).bind(page.limit()).bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        orders(rows)
    }

    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn update_order(&self, order: &Order) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, payment_status = $3, updated_at = $4 WHERE id = $1")
            .bind(order.id())
            .bind(order.status().as_str())
            .bind(order.payment_status().as_str())
            .bind(order.updated_at())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let (token_hash, expires_at) = verification_columns(account);
        sqlx::query(
            "INSERT INTO accounts (id, username, email, password_hash, role, provider, is_verified, verification_token_hash, verification_expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(account.id).bind(&account.username).bind(&account.email).bind(&account.password_hash)
        .bind(account.role.as_str()).bind(&account.provider).bind(account.is_verified)
        .bind(token_hash).bind(expires_at).bind(account.created_at).bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn account_by_verification_hash(&self, token_hash: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE verification_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn update_account(&self, account: &Account) -> Result<bool, StoreError> {
        let (token_hash, expires_at) = verification_columns(account);
        let result = sqlx::query(
            "UPDATE accounts SET username = $2, password_hash = $3, role = $4, is_verified = $5, verification_token_hash = $6, verification_expires_at = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(account.id).bind(&account.username).bind(&account.password_hash).bind(account.role.as_str())
        .bind(account.is_verified).bind(token_hash).bind(expires_at).bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_accounts(&self, page: Page) -> Result<(Vec<Account>, i64), StoreError> {
        let rows = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2")
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts").fetch_one(&self.pool).await?;
        let accounts = rows.into_iter().map(Account::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((accounts, total))
    }
}

fn verification_columns(account: &Account) -> (Option<&str>, Option<DateTime<Utc>>) {
    match &account.verification {
        Some(v) => (Some(v.token_hash.as_str()), Some(v.expires_at)),
        None => (None, None),
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn subscribe(&self, notification: &StockNotification) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO stock_notifications (id, product_id, email, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (product_id, email) WHERE notified_at IS NULL DO NOTHING",
        )
        .bind(notification.id)
        .bind(notification.product_id)
        .bind(&notification.email)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn drain_pending(&self, product_id: Uuid) -> Result<Vec<StockNotification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "UPDATE stock_notifications SET notified_at = NOW() WHERE product_id = $1 AND notified_at IS NULL RETURNING *",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StockNotification::from).collect())
    }
}
