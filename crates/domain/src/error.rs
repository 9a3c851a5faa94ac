//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::pricing::PromotionError;

/// Errors that can occur during domain operations.
///
/// Every operation runs in a single store transaction, so returning any of
/// these leaves the store exactly as it was before the call.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed input (non-positive quantity, negative amount, missing field).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced variant, cart item, order, rule or customer does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested quantity exceeds the stock on hand.
    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    Stock {
        sku: String,
        requested: i64,
        available: i64,
    },

    /// Checkout was attempted on a cart with no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// A promotion code was named at checkout but cannot be redeemed.
    #[error("Promotion error: {0}")]
    Promotion(#[from] PromotionError),

    /// The request clashes with current state (no open cart, illegal status
    /// change, duplicate key, referenced row).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The principal lacks the capability the operation requires.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label used to tag failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::NotFound { .. } => "not_found",
            DomainError::Stock { .. } => "stock",
            DomainError::EmptyCart => "empty_cart",
            DomainError::Promotion(_) => "promotion",
            DomainError::Conflict(_) => "conflict",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::Store(StoreError::LockTimeout) => "lock_timeout",
            DomainError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                DomainError::Conflict(format!("duplicate value violates {constraint}"))
            }
            StoreError::Restricted(reason) => DomainError::Conflict(reason),
            StoreError::OutOfRange(what) => {
                DomainError::Validation(format!("{what} is out of range"))
            }
            other => DomainError::Store(other),
        }
    }
}
