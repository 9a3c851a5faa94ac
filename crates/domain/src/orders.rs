//! Order queries and the status lifecycle.

use chrono::Utc;
use common::{MovementReason, OrderId, OrderStatus};
use store::{CommerceStore, Metadata, Order, StoreTransaction};

use crate::auth::{Operation, Principal, authorize};
use crate::error::DomainError;
use crate::inventory::apply_movement;

/// Command to move an order to a new status.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl UpdateOrderStatus {
    /// Creates a new UpdateOrderStatus command.
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self { order_id, status }
    }
}

/// Service for reading orders and driving their status.
pub struct OrderService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads one order.
    ///
    /// Customers only see their own orders; anything else is `NotFound`.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn get(&self, principal: &Principal, order_id: OrderId) -> Result<Order, DomainError> {
        authorize(principal, Operation::ViewOrder)?;

        let mut tx = self.store.begin().await?;
        let customer = tx.get_or_create_customer(principal.new_customer()).await?;
        let order = tx.get_order(order_id).await?;
        tx.commit().await?;

        match order {
            Some(order) if principal.is_staff() || order.customer_id == Some(customer.id) => {
                Ok(order)
            }
            _ => Err(DomainError::not_found("order", order_id)),
        }
    }

    /// Lists the principal's orders, newest first.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn list_mine(&self, principal: &Principal) -> Result<Vec<Order>, DomainError> {
        authorize(principal, Operation::ViewOwnOrders)?;

        let mut tx = self.store.begin().await?;
        let customer = tx.get_or_create_customer(principal.new_customer()).await?;
        let orders = tx.list_orders(Some(customer.id)).await?;
        tx.commit().await?;

        Ok(orders)
    }

    /// Lists every order, newest first.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn list_all(&self, principal: &Principal) -> Result<Vec<Order>, DomainError> {
        authorize(principal, Operation::ListAllOrders)?;

        let mut tx = self.store.begin().await?;
        let orders = tx.list_orders(None).await?;
        tx.rollback().await?;

        Ok(orders)
    }

    /// Moves an order along its lifecycle.
    ///
    /// Cancelling or refunding puts the ordered quantities back into stock
    /// through the ledger in the same transaction.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn update_status(
        &self,
        principal: &Principal,
        cmd: UpdateOrderStatus,
    ) -> Result<Order, DomainError> {
        authorize(principal, Operation::UpdateOrderStatus)?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(cmd.order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", cmd.order_id))?;

        if !order.status.can_transition_to(cmd.status) {
            return Err(DomainError::Conflict(format!(
                "cannot move order {} from {} to {}",
                order.order_number, order.status, cmd.status
            )));
        }

        if cmd.status.returns_stock() {
            let reason = match cmd.status {
                OrderStatus::Refunded => MovementReason::Refund,
                _ => MovementReason::Restock,
            };
            // Variants are locked in id order, as checkout does.
            let mut lines: Vec<_> = order.items.iter().collect();
            lines.sort_by_key(|item| item.variant_id);
            let ids: Vec<_> = lines.iter().map(|item| item.variant_id).collect();
            tx.lock_variants(&ids).await?;

            for item in lines {
                let mut metadata = Metadata::new();
                metadata.insert("order_id".to_string(), serde_json::json!(order.id));
                metadata.insert(
                    "order_number".to_string(),
                    serde_json::json!(order.order_number),
                );
                metadata.insert("status".to_string(), serde_json::json!(cmd.status));
                apply_movement(&mut tx, item.variant_id, item.qty, reason, metadata).await?;
            }
        }

        tx.set_order_status(order.id, cmd.status).await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            from = %order.status,
            to = %cmd.status,
            "order status changed"
        );
        order.status = cmd.status;
        order.updated_at = Utc::now();
        Ok(order)
    }
}
