//! HTTP handlers, grouped by resource.

pub mod carts;
pub mod catalog;
pub mod customers;
pub mod inventory;
pub mod orders;
pub mod system;

use domain::{
    CartService, CatalogService, CheckoutPolicy, CheckoutService, CustomerService,
    InventoryLedger, OrderService,
};
use store::CommerceStore;
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub inventory: InventoryLedger<S>,
    pub customers: CustomerService<S>,
}

impl<S: CommerceStore> AppState<S> {
    /// Wires every service to the same store.
    pub fn new(store: S, policy: CheckoutPolicy) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkout: CheckoutService::with_policy(store.clone(), policy),
            orders: OrderService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            inventory: InventoryLedger::new(store.clone()),
            customers: CustomerService::new(store),
        }
    }
}

/// Parses a path segment into a typed identifier.
fn parse_id<T: From<Uuid>>(id: &str) -> Result<T, ApiError> {
    let uuid = Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(T::from(uuid))
}
