//! Cart commands.

use common::{CartItemId, VariantId};

/// Command to add a variant to the principal's open cart.
#[derive(Debug, Clone, Copy)]
pub struct AddCartItem {
    /// The variant to add.
    pub variant_id: VariantId,

    /// Quantity to add; merged into an existing line for the same variant.
    pub qty: i64,
}

impl AddCartItem {
    /// Creates a new AddCartItem command.
    pub fn new(variant_id: VariantId, qty: i64) -> Self {
        Self { variant_id, qty }
    }
}

/// Command to set the quantity of a cart line.
#[derive(Debug, Clone, Copy)]
pub struct UpdateCartItem {
    pub item_id: CartItemId,

    /// New quantity; zero or less removes the line.
    pub qty: i64,
}

impl UpdateCartItem {
    /// Creates a new UpdateCartItem command.
    pub fn new(item_id: CartItemId, qty: i64) -> Self {
        Self { item_id, qty }
    }
}

/// Command to delete a cart line.
#[derive(Debug, Clone, Copy)]
pub struct RemoveCartItem {
    pub item_id: CartItemId,
}

impl RemoveCartItem {
    /// Creates a new RemoveCartItem command.
    pub fn new(item_id: CartItemId) -> Self {
        Self { item_id }
    }
}
