//! The inventory ledger.
//!
//! Every change to a variant's stock counter goes through
//! [`apply_movement`], which appends the ledger entry and moves the counter
//! inside the caller's transaction. That keeps Σ change equal to stock for
//! variants whose stock has only ever been changed here.

use common::{MovementReason, VariantId};
use serde::Serialize;
use store::{CommerceStore, InventoryMovement, Metadata, StoreTransaction};

use crate::auth::{Operation, Principal, authorize};
use crate::error::DomainError;

/// Appends a ledger entry and adjusts stock by `change` in the same transaction.
///
/// Does not refuse a negative result; sale paths check stock under lock first.
pub(crate) async fn apply_movement<T: StoreTransaction>(
    tx: &mut T,
    variant_id: VariantId,
    change: i64,
    reason: MovementReason,
    metadata: Metadata,
) -> Result<InventoryMovement, DomainError> {
    let movement = InventoryMovement::new(variant_id, change, reason, metadata);
    tx.insert_movement(&movement).await?;
    tx.adjust_stock(variant_id, change).await?;
    Ok(movement)
}

/// Command to record a manual stock movement.
#[derive(Debug, Clone)]
pub struct RecordMovement {
    pub variant_id: VariantId,
    pub change: i64,
    pub reason: MovementReason,
    pub metadata: Metadata,
}

impl RecordMovement {
    /// Creates a new RecordMovement command with empty metadata.
    pub fn new(variant_id: VariantId, change: i64, reason: MovementReason) -> Self {
        Self {
            variant_id,
            change,
            reason,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Stock counter compared with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub variant_id: VariantId,
    pub sku: String,
    pub stock: i64,
    pub ledger_total: i64,
    pub consistent: bool,
}

/// Service for recording and inspecting stock movements.
pub struct InventoryLedger<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> InventoryLedger<S> {
    /// Creates a new ledger over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Appends a movement and adjusts the variant's stock.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn record_movement(
        &self,
        principal: &Principal,
        cmd: RecordMovement,
    ) -> Result<InventoryMovement, DomainError> {
        authorize(principal, Operation::RecordMovement)?;
        if cmd.change == 0 {
            return Err(DomainError::Validation(
                "movement change must not be zero".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        tx.lock_variant(cmd.variant_id)
            .await?
            .ok_or_else(|| DomainError::not_found("variant", cmd.variant_id))?;

        let movement =
            apply_movement(&mut tx, cmd.variant_id, cmd.change, cmd.reason, cmd.metadata).await?;
        tx.commit().await?;

        metrics::counter!("inventory_movements_recorded", "reason" => cmd.reason.as_str())
            .increment(1);
        tracing::info!(change = cmd.change, reason = %cmd.reason, "movement recorded");
        Ok(movement)
    }

    /// Lists a variant's movements, newest first.
    #[tracing::instrument(skip(self, principal))]
    pub async fn movements(
        &self,
        principal: &Principal,
        variant_id: VariantId,
    ) -> Result<Vec<InventoryMovement>, DomainError> {
        authorize(principal, Operation::ViewMovements)?;

        let mut tx = self.store.begin().await?;
        tx.get_variant(variant_id)
            .await?
            .ok_or_else(|| DomainError::not_found("variant", variant_id))?;
        let movements = tx.movements_for_variant(variant_id).await?;
        tx.rollback().await?;

        Ok(movements)
    }

    /// Compares a variant's stock counter with the sum of its ledger entries.
    #[tracing::instrument(skip(self, principal))]
    pub async fn reconcile(
        &self,
        principal: &Principal,
        variant_id: VariantId,
    ) -> Result<Reconciliation, DomainError> {
        authorize(principal, Operation::ReconcileVariant)?;

        let mut tx = self.store.begin().await?;
        let variant = tx
            .get_variant(variant_id)
            .await?
            .ok_or_else(|| DomainError::not_found("variant", variant_id))?;
        let ledger_total = tx.movement_sum(variant_id).await?;
        tx.rollback().await?;

        if ledger_total != variant.stock {
            tracing::warn!(
                sku = %variant.sku,
                stock = variant.stock,
                ledger_total,
                "stock counter disagrees with ledger"
            );
        }

        Ok(Reconciliation {
            variant_id,
            sku: variant.sku,
            stock: variant.stock,
            ledger_total,
            consistent: ledger_total == variant.stock,
        })
    }
}
