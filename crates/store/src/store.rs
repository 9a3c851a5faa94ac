use std::time::Duration;

use async_trait::async_trait;
use common::{
    CartId, CartItemId, CartStatus, CustomerId, OrderId, OrderStatus, PricingRuleId, PromotionId,
    VariantId,
};

use crate::{
    Cart, CartItem, Customer, InventoryMovement, NewCustomer, Order, PricingRule, Promotion,
    PromotionWithRule, Result, Variant,
};

/// Default time a transaction waits for a lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry point to a transactional store.
///
/// Every domain operation runs inside exactly one transaction obtained from
/// [`CommerceStore::begin`]. Implementations must be thread-safe and cheap
/// to clone (they are shared across request handlers).
#[async_trait]
pub trait CommerceStore: Clone + Send + Sync + 'static {
    /// The unit of work handed out by [`CommerceStore::begin`].
    type Tx: StoreTransaction;

    /// Starts a unit of work.
    ///
    /// Nothing written through the returned transaction is visible to other
    /// transactions until [`StoreTransaction::commit`] succeeds. Dropping the
    /// transaction without committing discards every write.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of work against the store.
///
/// Methods named `lock_*` or `*_for_update` take an exclusive lock on the
/// rows they return, held until commit or rollback. Locks that cannot be
/// acquired within the store's timeout fail with
/// [`StoreError::LockTimeout`](crate::StoreError::LockTimeout).
#[async_trait]
pub trait StoreTransaction: Send + Sized {
    // Customers

    /// Returns the customer linked to `new.user_id`, inserting it first if absent.
    async fn get_or_create_customer(&mut self, new: NewCustomer) -> Result<Customer>;

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>>;

    /// Deletes a customer, first clearing `customer_id` on its carts and orders.
    ///
    /// Returns false if no such customer exists.
    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool>;

    // Variants

    /// Inserts a variant; fails with `UniqueViolation` on a duplicate SKU.
    async fn insert_variant(&mut self, variant: &Variant) -> Result<()>;

    async fn get_variant(&mut self, id: VariantId) -> Result<Option<Variant>>;

    /// Locks and returns one variant row.
    async fn lock_variant(&mut self, id: VariantId) -> Result<Option<Variant>>;

    /// Locks the given variants in ascending id order and returns the ones found.
    async fn lock_variants(&mut self, ids: &[VariantId]) -> Result<Vec<Variant>>;

    /// Adds `delta` to a variant's stock counter and returns the new value.
    async fn adjust_stock(&mut self, id: VariantId, delta: i64) -> Result<i64>;

    /// Deletes a variant together with its cart lines and ledger entries.
    ///
    /// Fails with `Restricted` if any order line references the variant.
    /// Returns false if no such variant exists.
    async fn delete_variant(&mut self, id: VariantId) -> Result<bool>;

    // Pricing

    async fn insert_pricing_rule(&mut self, rule: &PricingRule) -> Result<()>;

    async fn get_pricing_rule(&mut self, id: PricingRuleId) -> Result<Option<PricingRule>>;

    /// Inserts a promotion; codes are unique ignoring case.
    async fn insert_promotion(&mut self, promotion: &Promotion) -> Result<()>;

    /// Case-insensitive code lookup.
    async fn find_promotion(&mut self, code: &str) -> Result<Option<PromotionWithRule>>;

    /// Case-insensitive code lookup that locks the promotion row.
    async fn find_promotion_for_update(&mut self, code: &str)
    -> Result<Option<PromotionWithRule>>;

    async fn increment_promotion_usage(&mut self, id: PromotionId) -> Result<()>;

    // Carts

    /// Locks the customer row, then returns its open cart if there is one.
    ///
    /// Holding the customer lock is what keeps concurrent get-or-create
    /// calls from inserting two open carts.
    async fn find_open_cart_for_update(&mut self, customer_id: CustomerId)
    -> Result<Option<Cart>>;

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()>;

    async fn set_cart_status(&mut self, id: CartId, status: CartStatus) -> Result<()>;

    /// Returns a cart's lines in insertion order.
    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>>;

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        variant_id: VariantId,
    ) -> Result<Option<CartItem>>;

    async fn get_cart_item(
        &mut self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>>;

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()>;

    async fn set_cart_item_qty(&mut self, id: CartItemId, qty: i64) -> Result<()>;

    /// Returns false if the line did not exist.
    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool>;

    // Orders

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool>;

    /// Inserts an order together with its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Locks and returns one order.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders newest first, optionally restricted to one customer.
    async fn list_orders(&mut self, customer_id: Option<CustomerId>) -> Result<Vec<Order>>;

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()>;

    // Inventory ledger

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<()>;

    /// Lists a variant's ledger entries newest first.
    async fn movements_for_variant(&mut self, id: VariantId) -> Result<Vec<InventoryMovement>>;

    /// Returns Σ change over a variant's ledger entries.
    async fn movement_sum(&mut self, id: VariantId) -> Result<i64>;

    // Lifecycle

    /// Makes every write of this unit of work durable and releases its locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this unit of work and releases its locks.
    async fn rollback(self) -> Result<()>;
}
