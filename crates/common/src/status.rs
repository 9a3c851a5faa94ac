//! Persisted status and tag enums.
//!
//! Each enum round-trips through its lower-case text form, which is what
//! the store writes to its `TEXT` columns and what the API exposes.

use serde::{Deserialize, Serialize};

/// Error returned when a stored or submitted tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseStatusError {}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the stored text form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseStatusError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle of a cart.
///
/// ```text
/// Open ──► Converted
///   └────► Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    /// Accepting item changes; at most one per customer.
    #[default]
    Open,

    /// Turned into an order by checkout (terminal).
    Converted,

    /// Given up on (terminal).
    Abandoned,
}

text_enum!(CartStatus, "cart status", {
    Open => "open",
    Converted => "converted",
    Abandoned => "abandoned",
});

impl CartStatus {
    /// Returns true if items may still be changed.
    pub fn is_open(&self) -> bool {
        matches!(self, CartStatus::Open)
    }
}

/// Lifecycle of an order.
///
/// ```text
/// Pending ──► Paid ──► Fulfilled ──► Refunded
///    │          ├──────────────────────► Refunded
///    │          └──► Cancelled
///    └─────────────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created by checkout, awaiting payment.
    #[default]
    Pending,

    /// Payment confirmed.
    Paid,

    /// Shipped to the customer.
    Fulfilled,

    /// Cancelled before fulfilment (terminal).
    Cancelled,

    /// Money returned after payment (terminal).
    Refunded,
}

text_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Paid => "paid",
    Fulfilled => "fulfilled",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Returns true if the order may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Paid)
                | (Pending, Cancelled)
                | (Paid, Fulfilled)
                | (Paid, Cancelled)
                | (Paid, Refunded)
                | (Fulfilled, Refunded)
        )
    }

    /// Returns true if entering this status hands the goods back to stock.
    pub fn returns_stock(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

/// How a pricing rule computes its discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// `value` is a percentage of the subtotal.
    Percentage,

    /// `value` is an absolute amount, capped at the subtotal.
    Fixed,
}

text_enum!(RuleType, "rule type", {
    Percentage => "percentage",
    Fixed => "fixed",
});

/// Cause of an inventory ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Sale,
    Refund,
    Restock,
    Supplier,
    Adjustment,
}

text_enum!(MovementReason, "movement reason", {
    Sale => "sale",
    Refund => "refund",
    Restock => "restock",
    Supplier => "supplier",
    Adjustment => "adjustment",
});
