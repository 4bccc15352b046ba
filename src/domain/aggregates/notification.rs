//! "Notify me when in stock" subscriptions

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::account::normalize_email;
use crate::domain::aggregates::product::Product;
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockNotification {
    pub id: Uuid,
    pub product_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl StockNotification {
    pub fn subscribe(product_id: Uuid, email: &str) -> Self {
        Self { id: Uuid::now_v7(), product_id, email: normalize_email(email), created_at: Utc::now(), notified_at: None }
    }

    pub fn is_pending(&self) -> bool { self.notified_at.is_none() }
}

/// Event handed to the mailer once a product is back on the shelf.
pub fn back_in_stock(product: &Product, notified: &[StockNotification]) -> DomainEvent {
    DomainEvent::Product(ProductEvent::BackInStock {
        product_id: product.id,
        slug: product.slug.to_string(),
        name: product.name.clone(),
        emails: notified.iter().map(|n| n.email.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::macbook_spec;
    use crate::domain::value_objects::{Sku, Slug};

    #[test]
    fn test_back_in_stock_event_lists_emails() {
        let product = Product::create(Sku::generate(), Slug::from_name("MacBook Air M3").unwrap(), macbook_spec()).unwrap();
        let subs = vec![
            StockNotification::subscribe(product.id, "A@example.com"),
            StockNotification::subscribe(product.id, "b@example.com"),
        ];
        assert!(subs[0].is_pending());
        match back_in_stock(&product, &subs) {
            DomainEvent::Product(ProductEvent::BackInStock { emails, slug, .. }) => {
                assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
                assert_eq!(slug, "macbook-air-m3");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
