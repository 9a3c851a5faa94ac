//! Customer profiles.

use common::CustomerId;
use store::{CommerceStore, Customer, StoreTransaction};

use crate::auth::{Operation, Principal, authorize};
use crate::error::DomainError;

/// Service for customer profiles linked to principals.
pub struct CustomerService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CustomerService<S> {
    /// Creates a new customer service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the principal's profile, creating it on first use.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn me(&self, principal: &Principal) -> Result<Customer, DomainError> {
        authorize(principal, Operation::ViewOwnProfile)?;

        let mut tx = self.store.begin().await?;
        let customer = tx.get_or_create_customer(principal.new_customer()).await?;
        tx.commit().await?;

        Ok(customer)
    }

    /// Deletes a customer; their carts and orders are kept but unlinked.
    #[tracing::instrument(skip(self, principal))]
    pub async fn delete(
        &self,
        principal: &Principal,
        customer_id: CustomerId,
    ) -> Result<(), DomainError> {
        authorize(principal, Operation::DeleteCustomer)?;

        let mut tx = self.store.begin().await?;
        if !tx.delete_customer(customer_id).await? {
            return Err(DomainError::not_found("customer", customer_id));
        }
        tx.commit().await?;

        tracing::info!(%customer_id, "customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use store::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_me_is_idempotent() {
        let service = CustomerService::new(MemoryStore::new());
        let principal = Principal::customer("u1").with_email("u1@example.com");

        let first = service.me(&principal).await.unwrap();
        let second = service.me(&principal).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.email, "u1@example.com");
        assert_eq!(first.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_delete_requires_staff() {
        let service = CustomerService::new(MemoryStore::new());
        let customer = service.me(&Principal::customer("u1")).await.unwrap();

        let denied = service.delete(&Principal::customer("u1"), customer.id).await;
        assert!(matches!(denied, Err(DomainError::Forbidden(_))));

        service
            .delete(&Principal::staff("admin"), customer.id)
            .await
            .unwrap();
        let again = service.delete(&Principal::staff("admin"), customer.id).await;
        assert!(matches!(again, Err(DomainError::NotFound { .. })));
    }
}
