//! In-memory store.
//!
//! Intended for tests/dev. Enforces the same uniqueness rules as the schema.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{AccountStore, CatalogStore, NotificationStore, OrderStore, Page, StoreError};
use crate::domain::aggregates::{Account, Order, OrderStatus, Product, ProductStatus, StockNotification};

#[derive(Debug, Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<Uuid, Product>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    accounts: RwLock<HashMap<Uuid, Account>>,
    notifications: RwLock<Vec<StockNotification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|_| StoreError::Poisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|_| StoreError::Poisoned)
}

fn page_of<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

// Stored copies never carry unpublished events.
fn stored_product(product: &Product) -> Product {
    let mut p = product.clone();
    p.take_events();
    p
}

fn stored_order(order: &Order) -> Order {
    let mut o = order.clone();
    o.take_events();
    o
}

fn stored_account(account: &Account) -> Account {
    let mut a = account.clone();
    a.take_events();
    a
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = write(&self.products)?;
        if products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Duplicate("sku"));
        }
        if products.values().any(|p| p.slug == product.slug) {
            return Err(StoreError::Duplicate("slug"));
        }
        products.insert(product.id, stored_product(product));
        Ok(())
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(read(&self.products)?.values().any(|p| p.slug.as_str() == slug))
    }

    async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(read(&self.products)?.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(read(&self.products)?.values().find(|p| p.slug.as_str() == slug).cloned())
    }

    async fn products_by_category(&self, category: &str, page: Page) -> Result<Vec<Product>, StoreError> {
        let category = category.to_lowercase();
        let mut matching: Vec<Product> = read(&self.products)?
            .values()
            .filter(|p| p.category == category && p.status == ProductStatus::Active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_of(matching, page))
    }

    async fn update_product(&self, product: &Product) -> Result<bool, StoreError> {
        let mut products = write(&self.products)?;
        let others = || products.values().filter(|p| p.id != product.id);
        if others().any(|p| p.sku == product.sku) {
            return Err(StoreError::Duplicate("sku"));
        }
        if others().any(|p| p.slug == product.slug) {
            return Err(StoreError::Duplicate("slug"));
        }
        match products.get_mut(&product.id) {
            Some(existing) => {
                *existing = stored_product(product);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(write(&self.products)?.remove(&id).is_some())
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        Ok(read(&self.products)?.len() as i64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = write(&self.orders)?;
        if orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(StoreError::Duplicate("order_number"));
        }
        if let Some(key) = order.idempotency_key() {
            if orders.values().any(|o| o.idempotency_key() == Some(key)) {
                return Err(StoreError::Duplicate("idempotency_key"));
            }
        }
        orders.insert(order.id(), stored_order(order));
        Ok(())
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(read(&self.orders)?.get(&id).cloned())
    }

    async fn order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        Ok(read(&self.orders)?.values().find(|o| o.idempotency_key() == Some(key)).cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: Page) -> Result<(Vec<Order>, i64), StoreError> {
        let mut matching: Vec<Order> = read(&self.orders)?
            .values()
            .filter(|o| status.map_or(true, |s| o.status() == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        let total = matching.len() as i64;
        Ok((page_of(matching, page), total))
    }

    async fn count_orders(&self, status: Option<OrderStatus>) -> Result<i64, StoreError> {
        Ok(read(&self.orders)?.values().filter(|o| status.map_or(true, |s| o.status() == s)).count() as i64)
    }

    async fn orders_for_customer(&self, user_id: Uuid, email: &str, page: Page) -> Result<Vec<Order>, StoreError> {
        let mut matching: Vec<Order> = read(&self.orders)?
            .values()
            .filter(|o| o.user_id() == Some(user_id) || o.customer().email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(page_of(matching, page))
    }

    async fn update_order(&self, order: &Order) -> Result<bool, StoreError> {
        match write(&self.orders)?.get_mut(&order.id()) {
            Some(existing) => {
                *existing = stored_order(order);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = write(&self.accounts)?;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Duplicate("email"));
        }
        accounts.insert(account.id, stored_account(account));
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(read(&self.accounts)?.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(read(&self.accounts)?.values().find(|a| a.email == email).cloned())
    }

    async fn account_by_verification_hash(&self, token_hash: &str) -> Result<Option<Account>, StoreError> {
        Ok(read(&self.accounts)?
            .values()
            .find(|a| a.verification.as_ref().is_some_and(|v| v.token_hash == token_hash))
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<bool, StoreError> {
        match write(&self.accounts)?.get_mut(&account.id) {
            Some(existing) => {
                *existing = stored_account(account);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_accounts(&self, page: Page) -> Result<(Vec<Account>, i64), StoreError> {
        let mut all: Vec<Account> = read(&self.accounts)?.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = all.len() as i64;
        Ok((page_of(all, page), total))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn subscribe(&self, notification: &StockNotification) -> Result<bool, StoreError> {
        let mut notifications = write(&self.notifications)?;
        let exists = notifications
            .iter()
            .any(|n| n.product_id == notification.product_id && n.email == notification.email && n.is_pending());
        if exists {
            return Ok(false);
        }
        notifications.push(notification.clone());
        Ok(true)
    }

    async fn drain_pending(&self, product_id: Uuid) -> Result<Vec<StockNotification>, StoreError> {
        let now = Utc::now();
        let mut drained = Vec::new();
        for n in write(&self.notifications)?.iter_mut() {
            if n.product_id == product_id && n.is_pending() {
                n.notified_at = Some(now);
                drained.push(n.clone());
            }
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use crate::domain::aggregates::order::tests::{customer, item};
    use crate::domain::aggregates::product::tests::macbook_spec;
    use crate::domain::aggregates::Checkout;
    use crate::domain::value_objects::{Sku, Slug};

    fn product(sku: &str, name: &str) -> Product {
        Product::create(Sku::new(sku).unwrap(), Slug::from_name(name).unwrap(), macbook_spec()).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected() {
        let store = MemoryStore::new();
        store.insert_product(&product("MBA-1", "MacBook Air")).await.unwrap();
        let err = store.insert_product(&product("mba-1", "MacBook Air 2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("sku")));
        assert_eq!(store.count_products().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stored_products_have_no_events() {
        let store = MemoryStore::new();
        let p = product("MBA-1", "MacBook Air");
        store.insert_product(&p).await.unwrap();
        let mut loaded = store.product_by_slug("macbook-air").await.unwrap().unwrap();
        assert!(loaded.take_events().is_empty());
    }

    #[tokio::test]
    async fn test_category_listing_pages() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert_product(&product(&format!("SKU-{i}"), &format!("Mac {i}"))).await.unwrap();
        }
        let first = store.products_by_category("MacBook", Page::new(Some(1), Some(2))).await.unwrap();
        let last = store.products_by_category("macbook", Page::new(Some(3), Some(2))).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(last.len(), 1);
        assert!(store.products_by_category("ipad", Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscriptions_drain_once() {
        let store = MemoryStore::new();
        let id = Uuid::now_v7();
        assert!(store.subscribe(&StockNotification::subscribe(id, "a@example.com")).await.unwrap());
        assert!(!store.subscribe(&StockNotification::subscribe(id, "A@example.com")).await.unwrap());
        assert_eq!(store.drain_pending(id).await.unwrap().len(), 1);
        assert!(store.drain_pending(id).await.unwrap().is_empty());
        assert!(store.subscribe(&StockNotification::subscribe(id, "a@example.com")).await.unwrap());
    }

    fn order() -> Order {
        let checkout = Checkout {
            customer: customer(), items: vec![item("iPad Air", 600, 1)], client_total: Decimal::from(600),
            user_id: None, idempotency_key: None, note: None,
        };
        Order::place(checkout).unwrap()
    }

    #[tokio::test]
    async fn test_order_counts_follow_status() {
        let store = MemoryStore::new();
        assert_eq!(store.count_orders(None).await.unwrap(), 0);

        let mut confirmed = order();
        store.insert_order(&confirmed).await.unwrap();
        // Order numbers are millisecond-based.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.insert_order(&order()).await.unwrap();
        confirmed.update_status(OrderStatus::Confirmed).unwrap();
        assert!(store.update_order(&confirmed).await.unwrap());

        assert_eq!(store.count_orders(None).await.unwrap(), 2);
        assert_eq!(store.count_orders(Some(OrderStatus::Pending)).await.unwrap(), 1);
        assert_eq!(store.count_orders(Some(OrderStatus::Delivered)).await.unwrap(), 0);
    }
}
