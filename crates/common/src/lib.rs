//! Shared vocabulary for the commerce backend: typed identifiers, exact
//! decimal money and the persisted status enums.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{CartStatus, MovementReason, OrderStatus, ParseStatusError, RuleType};
pub use types::{
    CartId, CartItemId, CustomerId, MovementId, OrderId, OrderItemId, PricingRuleId, ProductId,
    PromotionId, VariantId,
};
