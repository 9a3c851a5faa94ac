//! Catalog administration: variants, pricing rules and promotions.

use chrono::{DateTime, Utc};
use common::{
    Money, MovementReason, PricingRuleId, ProductId, PromotionId, RuleType, VariantId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{CommerceStore, Metadata, PricingRule, Promotion, StoreTransaction, Variant};

use crate::auth::{Operation, Principal, authorize};
use crate::error::DomainError;
use crate::inventory::apply_movement;
use crate::pricing::validate_promotion;

const DEFAULT_CURRENCY: &str = "USD";

/// Input for a new variant.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVariant {
    /// Owning product; a fresh id is assigned when absent.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub sku: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub currency: Option<String>,

    /// Opening stock, recorded as a restock movement.
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub attributes: Metadata,
}

impl NewVariant {
    /// Creates input for a variant with no sale price and no stock.
    pub fn new(sku: impl Into<String>, price: Money) -> Self {
        Self {
            product_id: None,
            sku: sku.into(),
            name: None,
            price,
            sale_price: None,
            currency: None,
            stock: 0,
            attributes: Metadata::new(),
        }
    }

    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_sale_price(mut self, sale_price: Money) -> Self {
        self.sale_price = Some(sale_price);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::Validation("sku must not be empty".to_string()));
        }
        if self.price.is_negative() || self.sale_price.is_some_and(|p| p.is_negative()) {
            return Err(DomainError::Validation(
                "prices must not be negative".to_string(),
            ));
        }
        if !self.price.is_storable() || self.sale_price.is_some_and(|p| !p.is_storable()) {
            return Err(DomainError::Validation(format!(
                "prices must not exceed {}",
                Money::max_storable()
            )));
        }
        if self.stock < 0 {
            return Err(DomainError::Validation(
                "opening stock must not be negative".to_string(),
            ));
        }
        if let Some(currency) = &self.currency
            && (currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()))
        {
            return Err(DomainError::Validation(format!(
                "currency '{currency}' is not a three-letter code"
            )));
        }
        Ok(())
    }
}

/// Input for a new pricing rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPricingRule {
    pub name: String,
    pub rule_type: RuleType,
    pub value: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

impl NewPricingRule {
    /// Creates an always-on rule.
    pub fn new(name: impl Into<String>, rule_type: RuleType, value: Decimal) -> Self {
        Self {
            name: name.into(),
            rule_type,
            value,
            active: true,
            starts_at: None,
            ends_at: None,
        }
    }

    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.value.is_sign_negative() {
            return Err(DomainError::Validation(
                "rule value must not be negative".to_string(),
            ));
        }
        if !Money::new(self.value).is_storable() {
            return Err(DomainError::Validation(format!(
                "rule value must not exceed {}",
                Money::max_storable()
            )));
        }
        if self.rule_type == RuleType::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(DomainError::Validation(
                "percentage must not exceed 100".to_string(),
            ));
        }
        if let (Some(starts_at), Some(ends_at)) = (self.starts_at, self.ends_at)
            && starts_at > ends_at
        {
            return Err(DomainError::Validation(
                "starts_at must not be after ends_at".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input for a new promotion.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPromotion {
    pub code: String,
    pub name: String,
    pub rule_id: PricingRuleId,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub usage_limit: Option<i64>,
}

impl NewPromotion {
    /// Creates an active, unlimited promotion.
    pub fn new(code: impl Into<String>, name: impl Into<String>, rule_id: PricingRuleId) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            rule_id,
            active: true,
            usage_limit: None,
        }
    }

    pub fn with_usage_limit(mut self, limit: i64) -> Self {
        self.usage_limit = Some(limit);
        self
    }
}

fn default_active() -> bool {
    true
}

/// A redeemable promotion as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionSummary {
    pub code: String,
    pub name: String,
    pub rule_type: RuleType,
    pub value: Decimal,
    pub available: bool,
}

/// Service for staff-maintained catalog records.
pub struct CatalogService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CatalogService<S> {
    /// Creates a new catalog service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a variant and records its opening stock in the ledger.
    #[tracing::instrument(skip(self, principal, input), fields(sku = %input.sku))]
    pub async fn create_variant(
        &self,
        principal: &Principal,
        input: NewVariant,
    ) -> Result<Variant, DomainError> {
        authorize(principal, Operation::CreateVariant)?;
        input.validate()?;

        let mut variant = Variant {
            id: VariantId::new(),
            product_id: input.product_id.unwrap_or_default(),
            sku: input.sku.trim().to_string(),
            name: input.name,
            price: input.price,
            sale_price: input.sale_price,
            currency: input
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            stock: 0,
            attributes: input.attributes,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_variant(&variant).await?;
        if input.stock > 0 {
            let mut metadata = Metadata::new();
            metadata.insert("source".to_string(), serde_json::json!("opening_stock"));
            apply_movement(
                &mut tx,
                variant.id,
                input.stock,
                MovementReason::Restock,
                metadata,
            )
            .await?;
            variant.stock = input.stock;
        }
        tx.commit().await?;

        tracing::info!(variant_id = %variant.id, stock = variant.stock, "variant created");
        Ok(variant)
    }

    #[tracing::instrument(skip(self, principal))]
    pub async fn get_variant(
        &self,
        principal: &Principal,
        variant_id: VariantId,
    ) -> Result<Variant, DomainError> {
        authorize(principal, Operation::ViewVariant)?;

        let mut tx = self.store.begin().await?;
        let variant = tx.get_variant(variant_id).await?;
        tx.rollback().await?;

        variant.ok_or_else(|| DomainError::not_found("variant", variant_id))
    }

    /// Deletes a variant with its cart lines and ledger entries.
    ///
    /// A variant that appears on any order is kept and the call is a `Conflict`.
    #[tracing::instrument(skip(self, principal))]
    pub async fn delete_variant(
        &self,
        principal: &Principal,
        variant_id: VariantId,
    ) -> Result<(), DomainError> {
        authorize(principal, Operation::DeleteVariant)?;

        let mut tx = self.store.begin().await?;
        if !tx.delete_variant(variant_id).await? {
            return Err(DomainError::not_found("variant", variant_id));
        }
        tx.commit().await?;

        tracing::info!(%variant_id, "variant deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self, principal, input), fields(rule_name = %input.name))]
    pub async fn create_pricing_rule(
        &self,
        principal: &Principal,
        input: NewPricingRule,
    ) -> Result<PricingRule, DomainError> {
        authorize(principal, Operation::CreatePricingRule)?;
        input.validate()?;

        let rule = PricingRule {
            id: PricingRuleId::new(),
            name: input.name,
            rule_type: input.rule_type,
            value: input.value,
            active: input.active,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_pricing_rule(&rule).await?;
        tx.commit().await?;

        Ok(rule)
    }

    /// Creates a promotion; codes are unique ignoring case.
    #[tracing::instrument(skip(self, principal, input), fields(code = %input.code))]
    pub async fn create_promotion(
        &self,
        principal: &Principal,
        input: NewPromotion,
    ) -> Result<Promotion, DomainError> {
        authorize(principal, Operation::CreatePromotion)?;
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(DomainError::Validation("code must not be empty".to_string()));
        }
        if input.usage_limit.is_some_and(|limit| limit < 0) {
            return Err(DomainError::Validation(
                "usage_limit must not be negative".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        tx.get_pricing_rule(input.rule_id)
            .await?
            .ok_or_else(|| DomainError::not_found("pricing rule", input.rule_id))?;

        let promotion = Promotion {
            id: PromotionId::new(),
            code,
            name: input.name,
            rule_id: input.rule_id,
            active: input.active,
            usage_limit: input.usage_limit,
            used_count: 0,
        };
        tx.insert_promotion(&promotion).await?;
        tx.commit().await?;

        Ok(promotion)
    }

    /// Reports whether a code can be redeemed right now.
    ///
    /// An unknown code is `NotFound`; a known but unusable one is a
    /// promotion error.
    #[tracing::instrument(skip(self, principal))]
    pub async fn apply_promotion(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<PromotionSummary, DomainError> {
        authorize(principal, Operation::ApplyPromotion)?;

        let mut tx = self.store.begin().await?;
        let found = tx.find_promotion(code).await?;
        tx.rollback().await?;

        let found = found.ok_or_else(|| DomainError::not_found("promotion", code))?;
        let found = validate_promotion(code, Some(&found), Utc::now())?;

        Ok(PromotionSummary {
            code: found.promotion.code.clone(),
            name: found.promotion.name.clone(),
            rule_type: found.rule.rule_type,
            value: found.rule.value,
            available: true,
        })
    }
}
