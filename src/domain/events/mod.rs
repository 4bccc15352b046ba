//! Domain events
use crate::domain::aggregates::order::{OrderStatus, PaymentStatus};
use crate::domain::role::Role;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Account(AccountEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: String, slug: String },
    Updated { product_id: Uuid },
    Deleted { product_id: Uuid },
    StockChanged { product_id: Uuid, quantity: i32 },
    BackInStock { product_id: Uuid, slug: String, name: String, emails: Vec<String> },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, email: String, total: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    PaymentChanged { order_id: Uuid, from: PaymentStatus, to: PaymentStatus },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    Registered { account_id: Uuid, email: String, provider: String },
    VerificationRequested { account_id: Uuid, email: String, verify_url: String },
    Verified { account_id: Uuid },
    RoleChanged { account_id: Uuid, role: Role },
}

impl DomainEvent {
    /// Message subject, `istore.<aggregate>.<event>`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::Updated { .. } => "updated",
                ProductEvent::Deleted { .. } => "deleted",
                ProductEvent::StockChanged { .. } => "stock_changed",
                ProductEvent::BackInStock { .. } => "back_in_stock",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::StatusChanged { .. } => "status_changed",
                OrderEvent::PaymentChanged { .. } => "payment_changed",
            }),
            Self::Account(e) => ("account", match e {
                AccountEvent::Registered { .. } => "registered",
                AccountEvent::VerificationRequested { .. } => "verification_requested",
                AccountEvent::Verified { .. } => "verified",
                AccountEvent::RoleChanged { .. } => "role_changed",
            }),
        };
        format!("istore.{aggregate}.{name}")
    }
}
