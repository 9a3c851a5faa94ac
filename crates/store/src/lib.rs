pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use model::{
    Cart, CartItem, Customer, InventoryMovement, Metadata, NewCustomer, Order, OrderItem,
    PricingRule, Promotion, PromotionWithRule, Variant,
};
pub use postgres::PostgresStore;
pub use store::{CommerceStore, DEFAULT_LOCK_TIMEOUT, StoreTransaction};
