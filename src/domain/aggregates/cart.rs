//! Cart Aggregate
//!
//! A priced, server-side view of what the shopper is about to order. Prices
//! always come from the catalog, never from the client.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::order::{checked_total, LineItem, OrderError};
use crate::domain::aggregates::product::{Product, VariantSelection};

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    subtotal: Decimal,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub slug: String,
    pub name: String,
    pub selection: VariantSelection,
    pub color: Option<String>,
    pub storage: Option<String>,
    pub region: Option<String>,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub available: bool,
}

impl CartItem {
    /// Prices `quantity` units of `product` in the selected configuration.
    pub fn priced(product: &Product, selection: VariantSelection, quantity: u32) -> Result<Self, OrderError> {
        let resolved = product.resolve(&selection);
        let unit_price = product.unit_price(&selection).ok_or(OrderError::AmountOutOfRange)?;
        Ok(Self {
            product_id: product.id,
            slug: product.slug.to_string(),
            name: product.name.clone(),
            color: resolved.color.map(|v| v.color_label.clone()),
            storage: resolved.storage.map(|v| v.label.clone()),
            region: resolved.region.map(|v| v.name.clone()),
            image: resolved.color.and_then(|v| v.image_ref.clone()),
            unit_price,
            available: product.is_available(),
            selection,
            quantity,
        })
    }

    pub fn line_total(&self) -> Result<Decimal, OrderError> {
        self.unit_price.checked_mul(Decimal::from(self.quantity)).ok_or(OrderError::AmountOutOfRange)
    }

    /// Order snapshot of this line.
    pub fn to_line_item(&self) -> LineItem {
        LineItem {
            product_name: self.name.clone(), price: self.unit_price, quantity: self.quantity,
            color: self.color.clone(), storage: self.storage.clone(), ram: None,
            region: self.region.clone(), image: self.image.clone(),
        }
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> Decimal { self.subtotal }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn is_fully_available(&self) -> bool { self.items.iter().all(|i| i.available) }

    /// Adds a line, merging it into an identical one. On error the cart is
    /// left as it was.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), OrderError> {
        let mut items = self.items.clone();
        if let Some(existing) = items.iter_mut().find(|i| i.product_id == item.product_id && i.selection == item.selection) {
            existing.quantity = existing.quantity.checked_add(item.quantity).ok_or(OrderError::AmountOutOfRange)?;
        } else {
            items.push(item);
        }
        self.subtotal = checked_total(items.iter().map(CartItem::line_total))?;
        self.items = items;
        Ok(())
    }

    pub fn line_items(&self) -> Vec<LineItem> { self.items.iter().map(CartItem::to_line_item).collect() }
}
