//! Domain layer for the commerce backend.
//!
//! This crate provides the core operations over a [`store::CommerceStore`]:
//! - Authorization policy mapping each operation to a required capability
//! - Pricing and promotion resolution
//! - The inventory ledger
//! - The cart aggregate and the checkout transaction
//! - Order lifecycle, catalog administration and customer profiles

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod customers;
pub mod error;
pub mod inventory;
pub mod orders;
pub mod pricing;

pub use auth::{Capability, Operation, Principal, Role, authorize, required_capability};
pub use cart::{AddCartItem, CartLine, CartService, CartView, RemoveCartItem, UpdateCartItem};
pub use catalog::{CatalogService, NewPricingRule, NewPromotion, NewVariant, PromotionSummary};
pub use checkout::{CheckoutPolicy, CheckoutRequest, CheckoutService, generate_order_number};
pub use customers::CustomerService;
pub use error::DomainError;
pub use inventory::{InventoryLedger, Reconciliation, RecordMovement};
pub use orders::{OrderService, UpdateOrderStatus};
pub use pricing::{
    AppliedPromotion, LineItem, PriceQuote, PromotionError, PromotionRequest, ResolveMode,
    resolve,
};
