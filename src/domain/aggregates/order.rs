//! Order Aggregate

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{check_amount, MobileNumber, MAX_AMOUNT};

/// Largest accepted gap between the client's total and the recomputed one
/// (one minor currency unit).
pub const TOTAL_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub mobile: MobileNumber,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 500))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub district: String,
    #[validate(length(min = 1, max = 100))]
    pub upazila: String,
}

/// Point-in-time copy of what was bought. Never refers back to the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[validate(length(min = 1, max = 200))]
    pub product_name: String,
    #[validate(custom = "storable_amount")]
    pub price: Decimal,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub ram: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl LineItem {
    pub fn line_total(&self) -> Result<Decimal, OrderError> {
        self.price.checked_mul(Decimal::from(self.quantity)).ok_or(OrderError::AmountOutOfRange)
    }
}

/// Sum of line totals, failing instead of overflowing.
pub fn checked_total<I>(totals: I) -> Result<Decimal, OrderError>
where
    I: IntoIterator<Item = Result<Decimal, OrderError>>,
{
    totals.into_iter().try_fold(Decimal::ZERO, |acc, line| acc.checked_add(line?).ok_or(OrderError::AmountOutOfRange))
}

/// `validator` hook for money fields that end up in a `NUMERIC(14, 2)` column.
pub fn storable_amount(value: &Decimal) -> Result<(), ValidationError> {
    check_amount(*value).map(drop).map_err(|e| ValidationError::new(e.code()))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl OrderStatus {
    /// Forward one step along the fulfilment path, or cancel anything not yet
    /// delivered.
    pub fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed) | (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
            (Delivered | Cancelled, _) => false,
            (_, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending), "confirmed" => Some(Self::Confirmed), "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped), "delivered" => Some(Self::Delivered), "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use PaymentStatus::*;
        matches!((self, next), (Pending, Paid) | (Pending, Failed) | (Paid, Refunded))
    }

    pub fn as_str(self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Failed => "failed", Self::Refunded => "refunded" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending), "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed), "refunded" => Some(Self::Refunded), _ => None,
        }
    }
}

/// `ORD-<unix millis><3 random digits>`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}{:03}", now.timestamp_millis(), rand::thread_rng().gen_range(0..1000))
}

/// Everything needed to place an order.
#[derive(Clone, Debug)]
pub struct Checkout {
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub client_total: Decimal,
    pub user_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub note: Option<String>,
}

/// Stored form of an order, used when loading from persistence.
#[derive(Clone, Debug)]
pub struct OrderParts {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub idempotency_key: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    customer: Customer,
    items: Vec<LineItem>,
    total: Decimal,
    status: OrderStatus,
    payment_status: PaymentStatus,
    #[serde(skip)]
    idempotency_key: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// Places an order. The total is recomputed from the line items and the
    /// client's figure is only accepted within [`TOTAL_TOLERANCE`].
    pub fn place(checkout: Checkout) -> Result<Self, OrderError> {
        if checkout.items.is_empty() { return Err(OrderError::NoItems); }
        if checkout.items.iter().any(|i| i.quantity == 0) { return Err(OrderError::InvalidQuantity); }
        if checkout.items.iter().any(|i| i.price < Decimal::ZERO) { return Err(OrderError::NegativePrice); }

        let total = checked_total(checkout.items.iter().map(LineItem::line_total))?;
        if total > MAX_AMOUNT { return Err(OrderError::AmountOutOfRange); }
        let gap = checkout.client_total.checked_sub(total).ok_or(OrderError::AmountOutOfRange)?;
        if gap.abs() > TOTAL_TOLERANCE {
            return Err(OrderError::TotalMismatch { expected: total, received: checkout.client_total });
        }

        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: generate_order_number(now), user_id: checkout.user_id,
            customer: checkout.customer, items: checkout.items, total,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            idempotency_key: checkout.idempotency_key, note: checkout.note,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, order_number: order.order_number.clone(),
            email: order.customer.email.clone(), total,
        }));
        Ok(order)
    }

    pub fn restore(parts: OrderParts) -> Self {
        Self {
            id: parts.id, order_number: parts.order_number, user_id: parts.user_id,
            customer: parts.customer, items: parts.items, total: parts.total,
            status: parts.status, payment_status: parts.payment_status,
            idempotency_key: parts.idempotency_key, note: parts.note,
            created_at: parts.created_at, updated_at: parts.updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Option<Uuid> { self.user_id }
    pub fn customer(&self) -> &Customer { &self.customer }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn total(&self) -> Decimal { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn idempotency_key(&self) -> Option<&str> { self.idempotency_key.as_deref() }
    pub fn note(&self) -> Option<&str> { self.note.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn update_status(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status.as_str(), to: next.as_str() });
        }
        let from = std::mem::replace(&mut self.status, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> { self.update_status(OrderStatus::Confirmed) }
    pub fn cancel(&mut self) -> Result<(), OrderError> { self.update_status(OrderStatus::Cancelled) }

    pub fn update_payment(&mut self, next: PaymentStatus) -> Result<(), OrderError> {
        if !self.payment_status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.payment_status.as_str(), to: next.as_str() });
        }
        let from = std::mem::replace(&mut self.payment_status, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("item quantity must be at least 1")]
    InvalidQuantity,
    #[error("item price must not be negative")]
    NegativePrice,
    #[error("amount out of range")]
    AmountOutOfRange,
    #[error("total {received} does not match items total {expected}")]
    TotalMismatch { expected: Decimal, received: Decimal },
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}
