use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CartId, CartItemId, CartStatus, CustomerId, OrderId, OrderStatus, PricingRuleId, PromotionId,
    VariantId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Cart, CartItem, Customer, InventoryMovement, NewCustomer, Order, PricingRule, Promotion,
    PromotionWithRule, Result, StoreError, Variant,
    store::{CommerceStore, DEFAULT_LOCK_TIMEOUT, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    customers: HashMap<CustomerId, Customer>,
    variants: HashMap<VariantId, Variant>,
    pricing_rules: HashMap<PricingRuleId, PricingRule>,
    promotions: HashMap<PromotionId, Promotion>,
    carts: HashMap<CartId, Cart>,
    cart_items: Vec<CartItem>,
    orders: Vec<Order>,
    movements: Vec<InventoryMovement>,
}

/// In-memory store for tests and local runs.
///
/// Transactions are fully serialized: [`CommerceStore::begin`] takes one
/// store-wide lock and holds it until the transaction commits or is dropped,
/// which is strictly stronger than the row locks the trait promises. Writes
/// go to a staged copy of the state that replaces the shared state only on
/// commit, so a dropped transaction leaves no trace.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new empty store whose transactions give up waiting after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout,
        }
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "timed out waiting for the store lock"
                );
                StoreError::LockTimeout
            })?;
        let staged = (*guard).clone();
        Ok(MemoryTransaction { guard, staged })
    }
}

/// A serialized unit of work over [`MemoryStore`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl MemoryTransaction {
    fn variant_mut(&mut self, id: VariantId) -> Result<&mut Variant> {
        self.staged
            .variants
            .get_mut(&id)
            .ok_or_else(|| StoreError::RowNotFound {
                entity: "variant",
                id: id.to_string(),
            })
    }

    fn with_rule(&self, promotion: Option<&Promotion>) -> Result<Option<PromotionWithRule>> {
        let Some(promotion) = promotion else {
            return Ok(None);
        };
        let rule = self
            .staged
            .pricing_rules
            .get(&promotion.rule_id)
            .cloned()
            .ok_or_else(|| StoreError::RowNotFound {
                entity: "pricing_rule",
                id: promotion.rule_id.to_string(),
            })?;
        Ok(Some(PromotionWithRule {
            promotion: promotion.clone(),
            rule,
        }))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_or_create_customer(&mut self, new: NewCustomer) -> Result<Customer> {
        if let Some(existing) = self
            .staged
            .customers
            .values()
            .find(|c| c.user_id.as_deref() == Some(new.user_id.as_str()))
        {
            return Ok(existing.clone());
        }

        let customer = new.into_customer();
        self.staged.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.staged.customers.get(&id).cloned())
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool> {
        if self.staged.customers.remove(&id).is_none() {
            return Ok(false);
        }
        for cart in self.staged.carts.values_mut() {
            if cart.customer_id == Some(id) {
                cart.customer_id = None;
            }
        }
        for order in &mut self.staged.orders {
            if order.customer_id == Some(id) {
                order.customer_id = None;
            }
        }
        Ok(true)
    }

    async fn insert_variant(&mut self, variant: &Variant) -> Result<()> {
        if self.staged.variants.values().any(|v| v.sku == variant.sku) {
            return Err(StoreError::UniqueViolation("variants_sku_key".to_string()));
        }
        self.staged.variants.insert(variant.id, variant.clone());
        Ok(())
    }

    async fn get_variant(&mut self, id: VariantId) -> Result<Option<Variant>> {
        Ok(self.staged.variants.get(&id).cloned())
    }

    async fn lock_variant(&mut self, id: VariantId) -> Result<Option<Variant>> {
        Ok(self.staged.variants.get(&id).cloned())
    }

    async fn lock_variants(&mut self, ids: &[VariantId]) -> Result<Vec<Variant>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.staged.variants.get(&id).cloned())
            .collect())
    }

    async fn adjust_stock(&mut self, id: VariantId, delta: i64) -> Result<i64> {
        let variant = self.variant_mut(id)?;
        variant.stock = variant.stock.checked_add(delta).ok_or_else(|| {
            StoreError::OutOfRange(format!("stock of variant {id} adjusted by {delta}"))
        })?;
        Ok(variant.stock)
    }

    async fn delete_variant(&mut self, id: VariantId) -> Result<bool> {
        if !self.staged.variants.contains_key(&id) {
            return Ok(false);
        }
        let referenced = self
            .staged
            .orders
            .iter()
            .flat_map(|o| o.items.iter())
            .any(|item| item.variant_id == id);
        if referenced {
            return Err(StoreError::Restricted(format!(
                "variant {id} is referenced by order items"
            )));
        }
        self.staged.cart_items.retain(|item| item.variant_id != id);
        self.staged.movements.retain(|m| m.variant_id != id);
        self.staged.variants.remove(&id);
        Ok(true)
    }

    async fn insert_pricing_rule(&mut self, rule: &PricingRule) -> Result<()> {
        self.staged.pricing_rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get_pricing_rule(&mut self, id: PricingRuleId) -> Result<Option<PricingRule>> {
        Ok(self.staged.pricing_rules.get(&id).cloned())
    }

    async fn insert_promotion(&mut self, promotion: &Promotion) -> Result<()> {
        let duplicate = self
            .staged
            .promotions
            .values()
            .any(|p| p.code.eq_ignore_ascii_case(&promotion.code));
        if duplicate {
            return Err(StoreError::UniqueViolation(
                "promotions_code_lower_key".to_string(),
            ));
        }
        self.staged.promotions.insert(promotion.id, promotion.clone());
        Ok(())
    }

    async fn find_promotion(&mut self, code: &str) -> Result<Option<PromotionWithRule>> {
        let promotion = self
            .staged
            .promotions
            .values()
            .find(|p| p.code.eq_ignore_ascii_case(code));
        self.with_rule(promotion)
    }

    async fn find_promotion_for_update(
        &mut self,
        code: &str,
    ) -> Result<Option<PromotionWithRule>> {
        self.find_promotion(code).await
    }

    async fn increment_promotion_usage(&mut self, id: PromotionId) -> Result<()> {
        let promotion =
            self.staged
                .promotions
                .get_mut(&id)
                .ok_or_else(|| StoreError::RowNotFound {
                    entity: "promotion",
                    id: id.to_string(),
                })?;
        promotion.used_count += 1;
        Ok(())
    }

    async fn find_open_cart_for_update(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<Cart>> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|c| c.customer_id == Some(customer_id) && c.status.is_open())
            .cloned())
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        self.staged.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn set_cart_status(&mut self, id: CartId, status: CartStatus) -> Result<()> {
        let cart = self
            .staged
            .carts
            .get_mut(&id)
            .ok_or_else(|| StoreError::RowNotFound {
                entity: "cart",
                id: id.to_string(),
            })?;
        cart.status = status;
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>> {
        Ok(self
            .staged
            .cart_items
            .iter()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        variant_id: VariantId,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .staged
            .cart_items
            .iter()
            .find(|item| item.cart_id == cart_id && item.variant_id == variant_id)
            .cloned())
    }

    async fn get_cart_item(
        &mut self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .staged
            .cart_items
            .iter()
            .find(|item| item.cart_id == cart_id && item.id == item_id)
            .cloned())
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()> {
        let duplicate = self
            .staged
            .cart_items
            .iter()
            .any(|i| i.cart_id == item.cart_id && i.variant_id == item.variant_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(
                "cart_items_cart_id_variant_id_key".to_string(),
            ));
        }
        self.staged.cart_items.push(item.clone());
        Ok(())
    }

    async fn set_cart_item_qty(&mut self, id: CartItemId, qty: i64) -> Result<()> {
        let item = self
            .staged
            .cart_items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| StoreError::RowNotFound {
                entity: "cart_item",
                id: id.to_string(),
            })?;
        item.qty = qty;
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool> {
        let before = self.staged.cart_items.len();
        self.staged.cart_items.retain(|item| item.id != id);
        Ok(self.staged.cart_items.len() != before)
    }

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool> {
        Ok(self
            .staged
            .orders
            .iter()
            .any(|o| o.order_number == order_number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.order_number_exists(&order.order_number).await? {
            return Err(StoreError::UniqueViolation(
                "orders_order_number_key".to_string(),
            ));
        }
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.staged.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.get_order(id).await
    }

    async fn list_orders(&mut self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        Ok(self
            .staged
            .orders
            .iter()
            .rev()
            .filter(|o| customer_id.is_none() || o.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        let order = self
            .staged
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::RowNotFound {
                entity: "order",
                id: id.to_string(),
            })?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<()> {
        if !self.staged.variants.contains_key(&movement.variant_id) {
            return Err(StoreError::RowNotFound {
                entity: "variant",
                id: movement.variant_id.to_string(),
            });
        }
        self.staged.movements.push(movement.clone());
        Ok(())
    }

    async fn movements_for_variant(&mut self, id: VariantId) -> Result<Vec<InventoryMovement>> {
        Ok(self
            .staged
            .movements
            .iter()
            .rev()
            .filter(|m| m.variant_id == id)
            .cloned()
            .collect())
    }

    async fn movement_sum(&mut self, id: VariantId) -> Result<i64> {
        self.staged
            .movements
            .iter()
            .filter(|m| m.variant_id == id)
            .try_fold(0_i64, |sum, m| sum.checked_add(m.change))
            .ok_or_else(|| StoreError::OutOfRange(format!("movement sum of variant {id}")))
    }

    async fn commit(self) -> Result<()> {
        let MemoryTransaction { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
