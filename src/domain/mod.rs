//! Catalog, checkout and account domain model.
pub mod aggregates;
pub mod events;
pub mod role;
pub mod value_objects;
