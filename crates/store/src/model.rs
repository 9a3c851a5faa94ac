//! Row types persisted by the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    CartId, CartItemId, CartStatus, CustomerId, Money, MovementId, MovementReason, OrderId,
    OrderItemId, OrderStatus, PricingRuleId, ProductId, PromotionId, RuleType, VariantId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Free-form JSON attributes attached to variants and ledger entries.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A customer profile linked to an external identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,

    /// Subject of the external identity; `None` once unlinked.
    pub user_id: Option<String>,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for customer get-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl NewCustomer {
    /// Builds the row that would be inserted if no customer exists yet.
    pub fn into_customer(self) -> Customer {
        Customer {
            id: CustomerId::new(),
            user_id: Some(self.user_id),
            email: self.email,
            name: self.name,
            phone: None,
            created_at: Utc::now(),
        }
    }
}

/// A purchasable SKU with its own price and on-hand stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub currency: String,
    pub stock: i64,
    pub attributes: Metadata,
}

impl Variant {
    /// Sale price when set, otherwise the regular price.
    pub fn effective_price(&self) -> Money {
        self.sale_price.unwrap_or(self.price)
    }
}

/// A customer's basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub customer_id: Option<CustomerId>,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates a new open cart for a customer.
    pub fn open_for(customer_id: CustomerId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            customer_id: Some(customer_id),
            status: CartStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One variant line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub variant_id: VariantId,
    pub qty: i64,

    /// Unit price captured when the line was first added.
    pub price_at_add: Money,
}

impl CartItem {
    /// Returns `price_at_add × qty`.
    pub fn line_total(&self) -> Money {
        self.price_at_add.times(self.qty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub name: String,
    pub rule_type: RuleType,

    /// Percentage for `Percentage` rules, an amount for `Fixed` rules.
    pub value: Decimal,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl PricingRule {
    /// Returns true if the rule is enabled and `now` falls inside its window.
    ///
    /// Either bound may be open.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if let Some(starts_at) = self.starts_at
            && now < starts_at
        {
            return false;
        }
        if let Some(ends_at) = self.ends_at
            && now > ends_at
        {
            return false;
        }
        true
    }
}

/// A redeemable code bound to one pricing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub code: String,
    pub name: String,
    pub rule_id: PricingRuleId,
    pub active: bool,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
}

impl Promotion {
    /// Returns true if the code is enabled and has uses left.
    pub fn is_available(&self) -> bool {
        if !self.active {
            return false;
        }
        match self.usage_limit {
            Some(limit) => self.used_count < limit,
            None => true,
        }
    }
}

/// A promotion joined with the rule it redeems.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionWithRule {
    pub promotion: Promotion,
    pub rule: PricingRule,
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    pub currency: String,
    pub payment_ref: Option<String>,
    pub promotion_code: Option<String>,
    pub shipping_address: serde_json::Value,
    pub billing_address: serde_json::Value,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub sku: String,
    pub qty: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// An append-only stock delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub variant_id: VariantId,

    /// Negative for outbound stock, positive for inbound.
    pub change: i64,
    pub reason: MovementReason,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// Creates a new entry stamped with the current time.
    pub fn new(
        variant_id: VariantId,
        change: i64,
        reason: MovementReason,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: MovementId::new(),
            variant_id,
            change,
            reason,
            metadata,
            created_at: Utc::now(),
        }
    }
}
