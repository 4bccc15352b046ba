//! Aggregates module
pub mod account;
pub mod cart;
pub mod notification;
pub mod order;
pub mod product;

pub use account::{Account, AccountError, PendingVerification};
pub use cart::{Cart, CartItem};
pub use notification::StockNotification;
pub use order::{Checkout, Customer, LineItem, Order, OrderError, OrderParts, OrderStatus, PaymentStatus};
pub use product::{
    ColorVariant, DetailRow, PreOrderConfig, Product, ProductError, ProductSpec, ProductStatus,
    RegionVariant, StorageVariant, VariantSelection,
};
