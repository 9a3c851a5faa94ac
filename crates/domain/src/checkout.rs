//! The cart-to-order checkout transaction.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use common::{CartStatus, Money, MovementReason, OrderId, OrderItemId, OrderStatus, VariantId};
use serde::Deserialize;
use store::{CartItem, CommerceStore, Metadata, Order, OrderItem, StoreTransaction, Variant};
use uuid::Uuid;

use crate::auth::{Operation, Principal, authorize};
use crate::error::DomainError;
use crate::inventory::apply_movement;
use crate::pricing::{self, LineItem, PromotionRequest, ResolveMode};

const ORDER_NUMBER_ATTEMPTS: usize = 8;

/// Tunable behavior of checkout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutPolicy {
    /// Increment a redeemed promotion's `used_count`.
    pub count_promotion_usage: bool,
}

/// Everything checkout needs besides the cart itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    /// Required; `null` or absent is a validation error.
    #[serde(default)]
    pub shipping_address: serde_json::Value,

    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<serde_json::Value>,
    #[serde(default)]
    pub payment_ref: Option<String>,
    #[serde(default)]
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub shipping_total: Option<Money>,
    #[serde(default)]
    pub tax_total: Option<Money>,
}

impl CheckoutRequest {
    /// Creates a request shipping to `shipping_address` with no extras.
    pub fn new(shipping_address: serde_json::Value) -> Self {
        Self {
            shipping_address,
            ..Self::default()
        }
    }

    pub fn with_billing_address(mut self, address: serde_json::Value) -> Self {
        self.billing_address = Some(address);
        self
    }

    pub fn with_payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    pub fn with_promotion_code(mut self, code: impl Into<String>) -> Self {
        self.promotion_code = Some(code.into());
        self
    }

    pub fn with_shipping_total(mut self, amount: Money) -> Self {
        self.shipping_total = Some(amount);
        self
    }

    pub fn with_tax_total(mut self, amount: Money) -> Self {
        self.tax_total = Some(amount);
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.shipping_address.is_null() {
            return Err(DomainError::Validation(
                "shipping_address is required".to_string(),
            ));
        }
        for (field, amount) in [
            ("shipping_total", self.shipping_total),
            ("tax_total", self.tax_total),
        ] {
            if amount.is_some_and(|a| a.is_negative()) {
                return Err(DomainError::Validation(format!(
                    "{field} must not be negative"
                )));
            }
            if amount.is_some_and(|a| !a.is_storable()) {
                return Err(DomainError::Validation(format!(
                    "{field} exceeds the maximum amount of {}",
                    Money::max_storable()
                )));
            }
        }
        Ok(())
    }

    /// Requested promotion code, ignoring blank input.
    fn promotion_code(&self) -> Option<&str> {
        self.promotion_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// Returns a fresh `ORD-` number with eight upper-case hex digits.
pub fn generate_order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}

async fn unique_order_number<T: StoreTransaction>(tx: &mut T) -> Result<String, DomainError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = generate_order_number();
        if !tx.order_number_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(%candidate, "order number collision, regenerating");
    }
    Err(DomainError::Conflict(
        "could not allocate a unique order number".to_string(),
    ))
}

/// Service that turns the principal's open cart into an order.
pub struct CheckoutService<S: CommerceStore> {
    store: S,
    policy: CheckoutPolicy,
}

impl<S: CommerceStore> CheckoutService<S> {
    /// Creates a new checkout service with the default policy.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, CheckoutPolicy::default())
    }

    pub fn with_policy(store: S, policy: CheckoutPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CheckoutPolicy {
        self.policy
    }

    /// Converts the principal's open cart into a pending order.
    ///
    /// Either the cart is converted and the order, its lines, the stock
    /// decrements and the sale movements are all committed, or nothing is.
    #[tracing::instrument(skip(self, principal, request), fields(user_id = %principal.user_id))]
    pub async fn checkout(
        &self,
        principal: &Principal,
        request: CheckoutRequest,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();
        let result = self.run(principal, request).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_total").increment(1);
                metrics::counter!("inventory_movements_recorded", "reason" => "sale")
                    .increment(order.items.len() as u64);
                tracing::info!(
                    order_number = %order.order_number,
                    grand_total = %order.grand_total,
                    items = order.items.len(),
                    "checkout completed"
                );
            }
            Err(err) => {
                metrics::counter!("checkout_failed", "reason" => err.kind()).increment(1);
                tracing::warn!(error = %err, "checkout failed");
            }
        }
        result
    }

    async fn run(
        &self,
        principal: &Principal,
        request: CheckoutRequest,
    ) -> Result<Order, DomainError> {
        authorize(principal, Operation::Checkout)?;
        request.validate()?;

        let mut tx = self.store.begin().await?;

        // The customer lock taken here is what a concurrent second checkout
        // of the same cart waits on; it then finds no open cart.
        let customer = tx.get_or_create_customer(principal.new_customer()).await?;
        let cart = tx
            .find_open_cart_for_update(customer.id)
            .await?
            .ok_or_else(|| DomainError::Conflict("no open cart".to_string()))?;

        let items = tx.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let variant_ids: Vec<VariantId> = items.iter().map(|item| item.variant_id).collect();
        let variants: HashMap<VariantId, Variant> = tx
            .lock_variants(&variant_ids)
            .await?
            .into_iter()
            .map(|variant| (variant.id, variant))
            .collect();

        let mut currency: Option<&str> = None;
        for item in &items {
            let variant = variants
                .get(&item.variant_id)
                .ok_or_else(|| DomainError::not_found("variant", item.variant_id))?;
            if item.qty > variant.stock {
                return Err(DomainError::Stock {
                    sku: variant.sku.clone(),
                    requested: item.qty,
                    available: variant.stock,
                });
            }
            match currency {
                None => currency = Some(variant.currency.as_str()),
                Some(c) if c != variant.currency => {
                    return Err(DomainError::Validation(format!(
                        "cart mixes currencies {c} and {}",
                        variant.currency
                    )));
                }
                Some(_) => {}
            }
        }
        let currency = currency.unwrap_or("USD").to_string();

        let lines: Vec<LineItem> = items
            .iter()
            .map(|item| LineItem::new(item.price_at_add, item.qty))
            .collect();
        let code = request.promotion_code();
        let found = match code {
            Some(code) => tx.find_promotion_for_update(code).await?,
            None => None,
        };
        let promotion = code.map(|code| PromotionRequest {
            code,
            found: found.as_ref(),
        });
        let quote = pricing::resolve(&lines, promotion, Utc::now(), ResolveMode::Checkout)?;

        if self.policy.count_promotion_usage
            && let Some(found) = &found
        {
            tx.increment_promotion_usage(found.promotion.id).await?;
        }

        let shipping_total = request.shipping_total.unwrap_or_default();
        let tax_total = request.tax_total.unwrap_or_default();
        let grand_total = quote
            .grand_total
            .checked_add(shipping_total)
            .and_then(|total| total.checked_add(tax_total))
            .filter(Money::is_storable)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "grand total exceeds the maximum amount of {}",
                    Money::max_storable()
                ))
            })?;
        let order_id = OrderId::new();
        let order_number = unique_order_number(&mut tx).await?;
        let now = Utc::now();

        let order_items: Vec<OrderItem> = items
            .iter()
            .zip(variants_in_cart_order(&items, &variants))
            .map(|(item, variant)| OrderItem {
                id: OrderItemId::new(),
                order_id,
                variant_id: item.variant_id,
                sku: variant.sku.clone(),
                qty: item.qty,
                unit_price: item.price_at_add,
                line_total: item.line_total(),
            })
            .collect();

        let billing_address = request
            .billing_address
            .clone()
            .filter(|address| !address.is_null())
            .unwrap_or_else(|| request.shipping_address.clone());

        let order = Order {
            id: order_id,
            order_number,
            customer_id: Some(customer.id),
            status: OrderStatus::Pending,
            subtotal: quote.subtotal,
            discount_total: quote.discount,
            shipping_total,
            tax_total,
            grand_total,
            currency,
            payment_ref: request.payment_ref,
            promotion_code: quote.applied_promotion.map(|applied| applied.code),
            shipping_address: request.shipping_address,
            billing_address,
            items: order_items,
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&order).await?;

        for item in &order.items {
            let mut metadata = Metadata::new();
            metadata.insert("order_id".to_string(), serde_json::json!(order.id));
            metadata.insert(
                "order_number".to_string(),
                serde_json::json!(order.order_number),
            );
            apply_movement(
                &mut tx,
                item.variant_id,
                -item.qty,
                MovementReason::Sale,
                metadata,
            )
            .await?;
        }

        tx.set_cart_status(cart.id, CartStatus::Converted).await?;
        tx.commit().await?;

        Ok(order)
    }
}

/// Variants aligned with `items`; every id was checked present above.
fn variants_in_cart_order<'a>(
    items: &'a [CartItem],
    variants: &'a HashMap<VariantId, Variant>,
) -> impl Iterator<Item = &'a Variant> + 'a {
    items
        .iter()
        .filter_map(|item| variants.get(&item.variant_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_format() {
        let number = generate_order_number();
        assert_eq!(number.len(), 12);
        assert!(number.starts_with("ORD-"));
        assert!(
            number[4..]
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn request_validation() {
        let request = CheckoutRequest::new(serde_json::Value::Null);
        assert!(matches!(
            request.validate(),
            Err(DomainError::Validation(_))
        ));

        let request = CheckoutRequest::new(serde_json::json!({"line1": "x"}))
            .with_shipping_total(Money::from_minor(-1));
        assert!(request.validate().is_err());

        let request = CheckoutRequest::new(serde_json::json!({"line1": "x"}))
            .with_tax_total(Money::from_minor(250));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn blank_promotion_code_is_ignored() {
        let request =
            CheckoutRequest::new(serde_json::json!({})).with_promotion_code("   ");
        assert_eq!(request.promotion_code(), None);

        let request =
            CheckoutRequest::new(serde_json::json!({})).with_promotion_code(" SAVE10 ");
        assert_eq!(request.promotion_code(), Some("SAVE10"));
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "shipping_address": {"line1": "1 Main St"},
            "shipping_total": "4.5"
        }))
        .unwrap();
        assert_eq!(request.shipping_total, Some(Money::from_minor(450)));
        assert!(request.billing_address.is_none());
        assert!(request.tax_total.is_none());
    }
}
