//! Cart service providing the basket operations.

use chrono::Utc;
use common::{CartId, CartItemId};
use store::{CartItem, CommerceStore, StoreTransaction};

use super::{AddCartItem, CartView, RemoveCartItem, UpdateCartItem, open_cart_in};
use crate::auth::{Operation, Principal, authorize};
use crate::error::DomainError;
use crate::pricing::{self, LineItem, PriceQuote, PromotionRequest, ResolveMode};

fn priced_lines(items: &[CartItem]) -> Vec<LineItem> {
    items
        .iter()
        .map(|item| LineItem::new(item.price_at_add, item.qty))
        .collect()
}

/// Fails with a validation error if the cart no longer prices within the
/// storable money range.
async fn ensure_cart_total_fits<T: StoreTransaction>(
    tx: &mut T,
    cart_id: CartId,
) -> Result<(), DomainError> {
    let items = tx.cart_items(cart_id).await?;
    pricing::subtotal(&priced_lines(&items)).map(|_| ())
}

/// Service for managing the principal's open cart.
///
/// Each method runs in its own store transaction. Quantity changes lock the
/// variant row so concurrent adds for the same variant cannot lose an
/// increment or oversell.
pub struct CartService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CartService<S> {
    /// Creates a new cart service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the principal's open cart, creating it if absent.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn get_or_create_open_cart(
        &self,
        principal: &Principal,
    ) -> Result<CartView, DomainError> {
        authorize(principal, Operation::ViewCart)?;

        let mut tx = self.store.begin().await?;
        let (_, cart) = open_cart_in(&mut tx, principal).await?;
        let items = tx.cart_items(cart.id).await?;
        tx.commit().await?;

        Ok(CartView::new(cart, items))
    }

    /// Adds a variant, merging into an existing line for the same variant.
    ///
    /// The line keeps the price captured when it was first added.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn add_item(
        &self,
        principal: &Principal,
        cmd: AddCartItem,
    ) -> Result<CartItem, DomainError> {
        authorize(principal, Operation::AddCartItem)?;
        if cmd.qty < 1 {
            return Err(DomainError::Validation(format!(
                "quantity must be at least 1, got {}",
                cmd.qty
            )));
        }

        let mut tx = self.store.begin().await?;
        let (_, cart) = open_cart_in(&mut tx, principal).await?;
        let variant = tx
            .lock_variant(cmd.variant_id)
            .await?
            .ok_or_else(|| DomainError::not_found("variant", cmd.variant_id))?;

        let existing = tx.find_cart_item(cart.id, variant.id).await?;
        let current = existing.as_ref().map_or(0, |item| item.qty);
        let total = current
            .checked_add(cmd.qty)
            .ok_or_else(|| DomainError::Validation("quantity is too large".to_string()))?;
        if total > variant.stock {
            return Err(DomainError::Stock {
                sku: variant.sku,
                requested: total,
                available: variant.stock,
            });
        }

        let item = match existing {
            Some(mut item) => {
                tx.set_cart_item_qty(item.id, total).await?;
                item.qty = total;
                item
            }
            None => {
                let item = CartItem {
                    id: CartItemId::new(),
                    cart_id: cart.id,
                    variant_id: variant.id,
                    qty: total,
                    price_at_add: variant.effective_price(),
                };
                tx.insert_cart_item(&item).await?;
                item
            }
        };
        ensure_cart_total_fits(&mut tx, cart.id).await?;
        tx.commit().await?;

        metrics::counter!("cart_items_added").increment(1);
        tracing::info!(sku = %variant.sku, qty = item.qty, "item added to cart");
        Ok(item)
    }

    /// Sets a line's quantity.
    ///
    /// A quantity of zero or less removes the line and returns `None`.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn update_item(
        &self,
        principal: &Principal,
        cmd: UpdateCartItem,
    ) -> Result<Option<CartItem>, DomainError> {
        authorize(principal, Operation::UpdateCartItem)?;

        let mut tx = self.store.begin().await?;
        let (_, cart) = open_cart_in(&mut tx, principal).await?;
        let mut item = tx
            .get_cart_item(cart.id, cmd.item_id)
            .await?
            .ok_or_else(|| DomainError::not_found("cart item", cmd.item_id))?;

        if cmd.qty <= 0 {
            tx.delete_cart_item(item.id).await?;
            tx.commit().await?;
            tracing::info!(item_id = %item.id, "item removed by zero quantity");
            return Ok(None);
        }

        let variant = tx
            .lock_variant(item.variant_id)
            .await?
            .ok_or_else(|| DomainError::not_found("variant", item.variant_id))?;
        if cmd.qty > variant.stock {
            return Err(DomainError::Stock {
                sku: variant.sku,
                requested: cmd.qty,
                available: variant.stock,
            });
        }

        tx.set_cart_item_qty(item.id, cmd.qty).await?;
        ensure_cart_total_fits(&mut tx, cart.id).await?;
        tx.commit().await?;

        item.qty = cmd.qty;
        Ok(Some(item))
    }

    /// Deletes a line; an unknown line is `NotFound`.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn remove_item(
        &self,
        principal: &Principal,
        cmd: RemoveCartItem,
    ) -> Result<(), DomainError> {
        authorize(principal, Operation::RemoveCartItem)?;

        let mut tx = self.store.begin().await?;
        let (_, cart) = open_cart_in(&mut tx, principal).await?;
        let item = tx
            .get_cart_item(cart.id, cmd.item_id)
            .await?
            .ok_or_else(|| DomainError::not_found("cart item", cmd.item_id))?;
        tx.delete_cart_item(item.id).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Prices the open cart with a promotion code without changing anything.
    ///
    /// An unusable code yields an undiscounted quote carrying the rejection.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn preview_promotion(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<PriceQuote, DomainError> {
        authorize(principal, Operation::PreviewCartPromotion)?;

        let mut tx = self.store.begin().await?;
        let customer = tx.get_or_create_customer(principal.new_customer()).await?;
        let items = match tx.find_open_cart_for_update(customer.id).await? {
            Some(cart) => tx.cart_items(cart.id).await?,
            None => Vec::new(),
        };
        let found = tx.find_promotion(code).await?;
        tx.commit().await?;

        let lines = priced_lines(&items);
        let request = PromotionRequest {
            code,
            found: found.as_ref(),
        };
        let quote = pricing::resolve(&lines, Some(request), Utc::now(), ResolveMode::Preview)?;

        let applied = if quote.applied_promotion.is_some() { "true" } else { "false" };
        metrics::counter!("promotion_previews", "applied" => applied).increment(1);
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, MovementReason, PricingRuleId, ProductId, PromotionId, RuleType, VariantId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use store::{MemoryStore, Metadata, PricingRule, Promotion, Variant};

    use super::*;
    use crate::inventory::apply_movement;

    async fn seed_variant(store: &MemoryStore, sku: &str, price: Decimal, stock: i64) -> Variant {
        let mut variant = Variant {
            id: VariantId::new(),
            product_id: ProductId::new(),
            sku: sku.to_string(),
            name: None,
            price: Money::new(price),
            sale_price: None,
            currency: "USD".to_string(),
            stock: 0,
            attributes: Metadata::new(),
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_variant(&variant).await.unwrap();
        apply_movement(&mut tx, variant.id, stock, MovementReason::Restock, Metadata::new())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        variant.stock = stock;
        variant
    }

    async fn seed_promotion(store: &MemoryStore, code: &str, rule_type: RuleType, value: Decimal) {
        let rule = PricingRule {
            id: PricingRuleId::new(),
            name: code.to_string(),
            rule_type,
            value,
            active: true,
            starts_at: None,
            ends_at: None,
        };
        let promotion = Promotion {
            id: PromotionId::new(),
            code: code.to_string(),
            name: code.to_string(),
            rule_id: rule.id,
            active: true,
            usage_limit: None,
            used_count: 0,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_pricing_rule(&rule).await.unwrap();
        tx.insert_promotion(&promotion).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let service = CartService::new(MemoryStore::new());
        let principal = Principal::customer("u1");

        let first = service.get_or_create_open_cart(&principal).await.unwrap();
        let second = service.get_or_create_open_cart(&principal).await.unwrap();

        assert_eq!(first.cart.id, second.cart.id);
        assert!(first.items.is_empty());
        assert_eq!(first.total, Money::zero());
    }

    #[tokio::test]
    async fn test_sequential_adds_merge_into_one_line() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(10.00), 10).await;

        let first = service
            .add_item(&principal, AddCartItem::new(variant.id, 2))
            .await
            .unwrap();
        let second = service
            .add_item(&principal, AddCartItem::new(variant.id, 3))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.qty, 5);
        let view = service.get_or_create_open_cart(&principal).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.total, Money::new(dec!(50.00)));
    }

    #[tokio::test]
    async fn test_add_uses_sale_price_snapshot() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let mut variant = seed_variant(&store, "SALE", dec!(10.00), 5).await;

        variant.sale_price = Some(Money::new(dec!(7.00)));
        let mut tx = store.begin().await.unwrap();
        tx.delete_variant(variant.id).await.unwrap();
        tx.insert_variant(&variant).await.unwrap();
        tx.commit().await.unwrap();

        let item = service
            .add_item(&principal, AddCartItem::new(variant.id, 1))
            .await
            .unwrap();
        assert_eq!(item.price_at_add, Money::new(dec!(7.00)));
    }

    #[tokio::test]
    async fn test_cart_total_beyond_money_range_is_rejected() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "LUX", dec!(9999999999.99), i64::MAX).await;

        let item = service
            .add_item(&principal, AddCartItem::new(variant.id, 1))
            .await
            .unwrap();
        let err = service
            .add_item(&principal, AddCartItem::new(variant.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = service
            .update_item(&principal, UpdateCartItem::new(item.id, i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let view = service.get_or_create_open_cart(&principal).await.unwrap();
        assert_eq!(view.items[0].item.qty, 1);
        assert_eq!(view.total, Money::max_storable());
    }

    #[tokio::test]
    async fn test_merge_beyond_stock_leaves_line_unchanged() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(10.00), 5).await;

        service
            .add_item(&principal, AddCartItem::new(variant.id, 3))
            .await
            .unwrap();
        let err = service
            .add_item(&principal, AddCartItem::new(variant.id, 3))
            .await
            .unwrap_err();

        match err {
            DomainError::Stock {
                sku,
                requested,
                available,
            } => {
                assert_eq!(sku, "A");
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("expected stock error, got {other:?}"),
        }
        let view = service.get_or_create_open_cart(&principal).await.unwrap();
        assert_eq!(view.items[0].item.qty, 3);
    }

    #[tokio::test]
    async fn test_add_rejects_non_positive_quantity() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let variant = seed_variant(&store, "A", dec!(10.00), 5).await;

        let result = service
            .add_item(&Principal::customer("u1"), AddCartItem::new(variant.id, 0))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_add_unknown_variant_is_not_found() {
        let service = CartService::new(MemoryStore::new());
        let result = service
            .add_item(
                &Principal::customer("u1"),
                AddCartItem::new(VariantId::new(), 1),
            )
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_item_quantity() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(10.00), 5).await;
        let item = service
            .add_item(&principal, AddCartItem::new(variant.id, 1))
            .await
            .unwrap();

        let updated = service
            .update_item(&principal, UpdateCartItem::new(item.id, 4))
            .await
            .unwrap();
        assert_eq!(updated.map(|i| i.qty), Some(4));

        let result = service
            .update_item(&principal, UpdateCartItem::new(item.id, 6))
            .await;
        assert!(matches!(result, Err(DomainError::Stock { .. })));
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(10.00), 5).await;
        let item = service
            .add_item(&principal, AddCartItem::new(variant.id, 2))
            .await
            .unwrap();

        let updated = service
            .update_item(&principal, UpdateCartItem::new(item.id, 0))
            .await
            .unwrap();
        assert!(updated.is_none());

        let view = service.get_or_create_open_cart(&principal).await.unwrap();
        assert!(view.items.is_empty());
    }

    #[tokio::test]
    async fn test_remove_item() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(10.00), 5).await;
        let item = service
            .add_item(&principal, AddCartItem::new(variant.id, 2))
            .await
            .unwrap();

        service
            .remove_item(&principal, RemoveCartItem::new(item.id))
            .await
            .unwrap();
        let again = service
            .remove_item(&principal, RemoveCartItem::new(item.id))
            .await;
        assert!(matches!(again, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_other_customers_lines_are_invisible() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let variant = seed_variant(&store, "A", dec!(10.00), 5).await;
        let item = service
            .add_item(&Principal::customer("u1"), AddCartItem::new(variant.id, 1))
            .await
            .unwrap();

        let result = service
            .remove_item(&Principal::customer("u2"), RemoveCartItem::new(item.id))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_preview_promotion_does_not_count_usage() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(50.00), 5).await;
        seed_promotion(&store, "SAVE10", RuleType::Percentage, dec!(10)).await;
        service
            .add_item(&principal, AddCartItem::new(variant.id, 2))
            .await
            .unwrap();

        let quote = service.preview_promotion(&principal, "save10").await.unwrap();
        assert_eq!(quote.discount, Money::new(dec!(10.00)));
        assert_eq!(quote.grand_total, Money::new(dec!(90.00)));

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_promotion("SAVE10").await.unwrap().unwrap();
        assert_eq!(found.promotion.used_count, 0);
    }

    #[tokio::test]
    async fn test_preview_unknown_code_degrades() {
        let store = MemoryStore::new();
        let service = CartService::new(store.clone());
        let principal = Principal::customer("u1");
        let variant = seed_variant(&store, "A", dec!(12.00), 5).await;
        service
            .add_item(&principal, AddCartItem::new(variant.id, 1))
            .await
            .unwrap();

        let quote = service.preview_promotion(&principal, "NOPE").await.unwrap();
        assert_eq!(quote.discount, Money::zero());
        assert_eq!(quote.grand_total, Money::new(dec!(12.00)));
        assert!(quote.rejection.is_some());
    }
}
