//! The cart aggregate.

mod commands;
mod service;

pub use commands::*;
pub use service::CartService;

use common::Money;
use serde::Serialize;
use store::{Cart, CartItem, Customer, StoreTransaction};

use crate::auth::Principal;
use crate::error::DomainError;

/// A cart line with its computed total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub line_total: Money,
}

impl From<CartItem> for CartLine {
    fn from(item: CartItem) -> Self {
        Self {
            line_total: item.line_total(),
            item,
        }
    }
}

/// A cart with its lines and total, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartLine>,
    pub total: Money,
}

impl CartView {
    pub fn new(cart: Cart, items: Vec<CartItem>) -> Self {
        let items: Vec<CartLine> = items.into_iter().map(CartLine::from).collect();
        let total = items.iter().map(|line| line.line_total).sum();
        Self { cart, items, total }
    }
}

/// Returns the principal's customer and open cart, creating either if absent.
///
/// The open-cart lookup holds the customer row lock, so concurrent callers
/// for the same customer serialize here instead of inserting two carts.
pub(crate) async fn open_cart_in<T: StoreTransaction>(
    tx: &mut T,
    principal: &Principal,
) -> Result<(Customer, Cart), DomainError> {
    let customer = tx.get_or_create_customer(principal.new_customer()).await?;
    if let Some(cart) = tx.find_open_cart_for_update(customer.id).await? {
        return Ok((customer, cart));
    }

    let cart = Cart::open_for(customer.id);
    tx.insert_cart(&cart).await?;
    tracing::debug!(cart_id = %cart.id, customer_id = %customer.id, "opened cart");
    Ok((customer, cart))
}

#[cfg(test)]
mod tests {
    use common::{CartId, CartItemId, CustomerId, VariantId};
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn view_total_sums_snapshot_line_totals() {
        let cart = Cart::open_for(CustomerId::new());
        let item = |qty, price| CartItem {
            id: CartItemId::new(),
            cart_id: CartId::new(),
            variant_id: VariantId::new(),
            qty,
            price_at_add: Money::new(price),
        };

        let view = CartView::new(cart, vec![item(3, dec!(10.00)), item(2, dec!(0.15))]);
        assert_eq!(view.items[0].line_total, Money::new(dec!(30.00)));
        assert_eq!(view.total, Money::new(dec!(30.30)));
    }

    #[test]
    fn empty_view_totals_zero() {
        let view = CartView::new(Cart::open_for(CustomerId::new()), Vec::new());
        assert_eq!(view.total, Money::zero());
    }
}
