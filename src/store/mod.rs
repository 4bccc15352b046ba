//! Persistence seam.
//!
//! Handlers talk to the catalog, orders, accounts and stock notifications
//! through the traits below. [`PgStore`] is the production backend;
//! [`MemoryStore`] backs tests and local development.
//!
//! Every write touches a single row, so the database's per-row atomicity is
//! all the coordination there is. Concurrent product edits are last-write-wins.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Account, Order, OrderStatus, Product, StockNotification};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated. Carries the offending field.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Offset pagination, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(Self::DEFAULT_PER_PAGE).clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.per_page) }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fails with `Duplicate("sku")` / `Duplicate("slug")` on collisions.
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError>;
    async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError>;
    /// Active products in a category, newest first.
    async fn products_by_category(&self, category: &str, page: Page) -> Result<Vec<Product>, StoreError>;
    /// Returns `false` when no product has that id.
    async fn update_product(&self, product: &Product) -> Result<bool, StoreError>;
    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn count_products(&self) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with `Duplicate("idempotency_key")` when the key was already used.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError>;
    /// Newest first, with the total row count for the filter.
    async fn list_orders(&self, status: Option<OrderStatus>, page: Page) -> Result<(Vec<Order>, i64), StoreError>;
    async fn count_orders(&self, status: Option<OrderStatus>) -> Result<i64, StoreError>;
    async fn orders_for_customer(&self, user_id: Uuid, email: &str, page: Page) -> Result<Vec<Order>, StoreError>;
    async fn update_order(&self, order: &Order) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `Duplicate("email")` when the address is registered.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;
    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn account_by_verification_hash(&self, token_hash: &str) -> Result<Option<Account>, StoreError>;
    async fn update_account(&self, account: &Account) -> Result<bool, StoreError>;
    async fn list_accounts(&self, page: Page) -> Result<(Vec<Account>, i64), StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Returns `false` if the email already has a pending subscription for the product.
    async fn subscribe(&self, notification: &StockNotification) -> Result<bool, StoreError>;
    /// Marks every pending subscription for the product as notified and returns them.
    async fn drain_pending(&self, product_id: Uuid) -> Result<Vec<StockNotification>, StoreError>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store: CatalogStore + OrderStore + AccountStore + NotificationStore {}

impl<T> Store for T where T: CatalogStore + OrderStore + AccountStore + NotificationStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_bounds() {
        let page = Page::new(None, None);
        assert_eq!((page.page, page.per_page, page.offset()), (1, 20, 0));
        let page = Page::new(Some(0), Some(1000));
        assert_eq!((page.page, page.per_page), (1, 100));
        assert_eq!(Page::new(Some(3), Some(10)).offset(), 20);
    }
}
