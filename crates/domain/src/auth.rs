//! Principals and the per-operation authorization policy.

use serde::{Deserialize, Serialize};
use store::NewCustomer;

use crate::error::DomainError;

/// Role asserted by the upstream identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Staff,
}

impl Role {
    /// Capabilities granted to this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Customer => &[ShopOwnCart, ViewOwnOrders, ViewOwnProfile, PreviewPromotions],
            Role::Staff => &[
                ShopOwnCart,
                ViewOwnOrders,
                ViewOwnProfile,
                PreviewPromotions,
                ViewAnyOrder,
                ManageOrders,
                ManageCatalog,
                ManageInventory,
                ManageCustomers,
            ],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            other => Err(DomainError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// The authenticated caller of a domain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject of the external identity.
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

impl Principal {
    /// Creates a customer principal.
    pub fn customer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            name: None,
            role: Role::Customer,
        }
    }

    /// Creates a staff principal.
    pub fn staff(user_id: impl Into<String>) -> Self {
        Self {
            role: Role::Staff,
            ..Self::customer(user_id)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// Profile used when this principal's customer row is first created.
    pub(crate) fn new_customer(&self) -> NewCustomer {
        NewCustomer {
            user_id: self.user_id.clone(),
            email: self.email.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_else(|| self.user_id.clone()),
        }
    }
}

/// A permission a role may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ShopOwnCart,
    ViewOwnOrders,
    ViewOwnProfile,
    PreviewPromotions,
    ViewAnyOrder,
    ManageOrders,
    ManageCatalog,
    ManageInventory,
    ManageCustomers,
}

/// Every operation the domain exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewCart,
    AddCartItem,
    UpdateCartItem,
    RemoveCartItem,
    PreviewCartPromotion,
    Checkout,
    ViewOwnOrders,
    ViewOrder,
    ListAllOrders,
    UpdateOrderStatus,
    CreateVariant,
    ViewVariant,
    DeleteVariant,
    CreatePricingRule,
    CreatePromotion,
    ApplyPromotion,
    RecordMovement,
    ViewMovements,
    ReconcileVariant,
    ViewOwnProfile,
    DeleteCustomer,
}

/// The policy table: the capability each operation requires.
pub fn required_capability(operation: Operation) -> Capability {
    use Capability as C;
    use Operation as Op;
    match operation {
        Op::ViewCart
        | Op::AddCartItem
        | Op::UpdateCartItem
        | Op::RemoveCartItem
        | Op::PreviewCartPromotion
        | Op::Checkout => C::ShopOwnCart,
        // Ownership of the order is checked by the order service.
        Op::ViewOwnOrders | Op::ViewOrder => C::ViewOwnOrders,
        Op::ListAllOrders => C::ViewAnyOrder,
        Op::UpdateOrderStatus => C::ManageOrders,
        Op::CreateVariant
        | Op::ViewVariant
        | Op::DeleteVariant
        | Op::CreatePricingRule
        | Op::CreatePromotion => C::ManageCatalog,
        Op::ApplyPromotion => C::PreviewPromotions,
        Op::RecordMovement | Op::ViewMovements | Op::ReconcileVariant => C::ManageInventory,
        Op::ViewOwnProfile => C::ViewOwnProfile,
        Op::DeleteCustomer => C::ManageCustomers,
    }
}

/// Fails with `Forbidden` unless the principal may perform `operation`.
pub fn authorize(principal: &Principal, operation: Operation) -> Result<(), DomainError> {
    let capability = required_capability(operation);
    if principal.role.has(capability) {
        Ok(())
    } else {
        tracing::debug!(user_id = %principal.user_id, ?operation, "operation denied");
        Err(DomainError::Forbidden(format!(
            "{operation:?} requires {capability:?}"
        )))
    }
}
