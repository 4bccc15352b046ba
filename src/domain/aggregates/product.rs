//! Product Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{check_amount, AmountError, Sku, Slug};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorVariant {
    pub id: u32,
    pub color_label: String,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub price_delta: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageVariant {
    pub id: u32,
    pub label: String,
    #[serde(default)]
    pub price_delta: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionVariant {
    pub name: String,
    #[serde(default)]
    pub price_delta: Decimal,
}

/// Free-form spec row shown on the product page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreOrderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub deposit_amount: Option<Decimal>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    #[default]
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self { Self::Draft => "draft", Self::Active => "active", Self::Archived => "archived" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s { "draft" => Some(Self::Draft), "active" => Some(Self::Active), "archived" => Some(Self::Archived), _ => None }
    }
}

/// A shopper's choice along each variant dimension. Anything left `None`, or
/// pointing at a variant the product doesn't have, adds nothing to the price.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSelection {
    #[serde(default)]
    pub color_id: Option<u32>,
    #[serde(default)]
    pub storage_id: Option<u32>,
    #[serde(default)]
    pub region_name: Option<String>,
}

/// The variants a selection resolved to.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolvedSelection<'a> {
    pub color: Option<&'a ColorVariant>,
    pub storage: Option<&'a StorageVariant>,
    pub region: Option<&'a RegionVariant>,
}

/// Admin-editable product content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductSpec {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub color_variants: Vec<ColorVariant>,
    pub storage_variants: Vec<StorageVariant>,
    pub region_variants: Vec<RegionVariant>,
    pub details: Vec<DetailRow>,
    pub pre_order_config: PreOrderConfig,
    pub stock_quantity: i32,
    pub status: ProductStatus,
}

impl ProductSpec {
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.category.trim().is_empty() { return Err(ProductError::MissingCategory); }
        if self.stock_quantity < 0 { return Err(ProductError::NegativeStock); }

        amount("basePrice", self.base_price)?;
        let deltas = self.color_variants.iter().map(|v| ("colorVariants", v.price_delta))
            .chain(self.storage_variants.iter().map(|v| ("storageVariants", v.price_delta)))
            .chain(self.region_variants.iter().map(|v| ("regionVariants", v.price_delta)));
        for (dimension, delta) in deltas {
            amount(&format!("{dimension}.priceDelta"), delta)?;
        }
        if let Some(deposit) = self.pre_order_config.deposit_amount {
            amount("preOrderConfig.depositAmount", deposit)?;
        }

        unique("colorVariants", self.color_variants.iter().map(|v| v.id.to_string()))?;
        unique("storageVariants", self.storage_variants.iter().map(|v| v.id.to_string()))?;
        unique("regionVariants", self.region_variants.iter().map(|v| v.name.trim().to_lowercase()))?;
        Ok(())
    }
}

fn amount(field: &str, value: Decimal) -> Result<(), ProductError> {
    check_amount(value).map(drop).map_err(|reason| ProductError::InvalidAmount { field: field.to_string(), reason })
}

fn unique(dimension: &str, keys: impl Iterator<Item = String>) -> Result<(), ProductError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key.clone()) {
            return Err(ProductError::DuplicateVariant { dimension: dimension.to_string(), key });
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub slug: Slug,
    pub category: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub color_variants: Vec<ColorVariant>,
    pub storage_variants: Vec<StorageVariant>,
    pub region_variants: Vec<RegionVariant>,
    pub details: Vec<DetailRow>,
    pub pre_order_config: PreOrderConfig,
    pub stock_quantity: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Product {
    pub fn create(sku: Sku, slug: Slug, spec: ProductSpec) -> Result<Self, ProductError> {
        spec.validate()?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, sku: sku.clone(), name: spec.name.trim().to_string(), slug: slug.clone(),
            category: spec.category.trim().to_lowercase(), description: spec.description,
            base_price: spec.base_price, color_variants: spec.color_variants,
            storage_variants: spec.storage_variants, region_variants: spec.region_variants,
            details: spec.details, pre_order_config: spec.pre_order_config,
            stock_quantity: spec.stock_quantity, status: spec.status,
            created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created {
            product_id: id, sku: sku.to_string(), slug: slug.to_string(),
        }));
        Ok(product)
    }

    /// Replaces the editable content. Stock is left to [`Product::set_stock`].
    pub fn apply(&mut self, spec: ProductSpec) -> Result<(), ProductError> {
        spec.validate()?;
        self.name = spec.name.trim().to_string();
        self.category = spec.category.trim().to_lowercase();
        self.description = spec.description;
        self.base_price = spec.base_price;
        self.color_variants = spec.color_variants;
        self.storage_variants = spec.storage_variants;
        self.region_variants = spec.region_variants;
        self.details = spec.details;
        self.pre_order_config = spec.pre_order_config;
        self.status = spec.status;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Updated { product_id: self.id }));
        Ok(())
    }

    pub fn rename_slug(&mut self, slug: Slug) { self.slug = slug; self.touch(); }

    /// Sets the on-hand quantity. Returns `true` when the product just came
    /// back into stock.
    pub fn set_stock(&mut self, quantity: i32) -> Result<bool, ProductError> {
        if quantity < 0 { return Err(ProductError::NegativeStock); }
        let restocked = self.stock_quantity <= 0 && quantity > 0;
        self.stock_quantity = quantity;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockChanged { product_id: self.id, quantity }));
        Ok(restocked)
    }

    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }
    pub fn is_available(&self) -> bool { self.is_in_stock() || self.pre_order_config.enabled }

    pub fn resolve<'a>(&'a self, selection: &VariantSelection) -> ResolvedSelection<'a> {
        ResolvedSelection {
            color: selection.color_id.and_then(|id| self.color_variants.iter().find(|v| v.id == id)),
            storage: selection.storage_id.and_then(|id| self.storage_variants.iter().find(|v| v.id == id)),
            region: selection.region_name.as_deref().and_then(|name| {
                self.region_variants.iter().find(|v| v.name.trim().eq_ignore_ascii_case(name.trim()))
            }),
        }
    }

    /// Price of one unit in the given configuration. `None` if the sum
    /// leaves the representable range.
    pub fn unit_price(&self, selection: &VariantSelection) -> Option<Decimal> {
        let r = self.resolve(selection);
        [r.color.map(|v| v.price_delta), r.storage.map(|v| v.price_delta), r.region.map(|v| v.price_delta)]
            .into_iter()
            .flatten()
            .try_fold(self.base_price, Decimal::checked_add)
    }

    /// `quantity × (basePrice + colorDelta + storageDelta + regionDelta)`.
    pub fn price_for(&self, selection: &VariantSelection, quantity: u32) -> Option<Decimal> {
        self.unit_price(selection)?.checked_mul(Decimal::from(quantity))
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("name is required")]
    MissingName,
    #[error("category is required")]
    MissingCategory,
    #[error("{field} {reason}")]
    InvalidAmount { field: String, reason: AmountError },
    #[error("stock quantity must not be negative")]
    NegativeStock,
    #[error("duplicate {dimension} entry {key}")]
    DuplicateVariant { dimension: String, key: String },
}
