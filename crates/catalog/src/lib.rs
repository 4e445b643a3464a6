//! Catalog service: products, stock counters, and the admin guard.
//!
//! [`CatalogService`] owns product definitions and the stock counter on each
//! product. Definition changes go through an [`AuthorizationDelegate`] that
//! asks a [`RoleResolver`](common::RoleResolver) who the caller is.
//! [`FulfillmentListener`] acknowledges new orders published by fulfillment.

pub mod authz;
pub mod error;
pub mod listener;
pub mod product;
pub mod service;

pub use authz::AuthorizationDelegate;
pub use error::{CatalogError, Result};
pub use listener::FulfillmentListener;
pub use product::{
    Feature, NewProduct, Product, ProductFilter, ProductKind, ProductPatch, ProductView, SortField,
};
pub use service::{CatalogService, ProductStream};
