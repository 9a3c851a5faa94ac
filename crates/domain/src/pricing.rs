//! Subtotal, discount and grand-total resolution.
//!
//! The resolver is pure: callers look the promotion up inside their own
//! transaction and hand it in together with the code that was asked for.

use chrono::{DateTime, Utc};
use common::{Money, RuleType};
use rust_decimal::Decimal;
use serde::Serialize;
use store::{PricingRule, PromotionWithRule};
use thiserror::Error;

use crate::error::DomainError;

/// Why a promotion code could not be redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "code", rename_all = "snake_case")]
pub enum PromotionError {
    #[error("promotion code '{0}' not found")]
    NotFound(String),

    #[error("promotion '{0}' is inactive")]
    Inactive(String),

    #[error("promotion '{0}' is outside its active window")]
    OutsideWindow(String),

    #[error("promotion '{0}' has reached its usage limit")]
    Exhausted(String),
}

/// Whether an unusable promotion fails the call or just yields no discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Rejections are reported on the quote; the call never fails.
    Preview,

    /// Rejections fail the call.
    Checkout,
}

/// One priced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItem {
    pub unit_price: Money,
    pub qty: i64,
}

impl LineItem {
    pub fn new(unit_price: Money, qty: i64) -> Self {
        Self { unit_price, qty }
    }
}

/// A promotion code together with what the store found for it.
#[derive(Debug, Clone, Copy)]
pub struct PromotionRequest<'a> {
    pub code: &'a str,
    pub found: Option<&'a PromotionWithRule>,
}

/// The promotion a quote was discounted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPromotion {
    pub code: String,
    pub rule_type: RuleType,
    pub value: Decimal,
}

/// Result of pricing a set of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub subtotal: Money,
    pub discount: Money,

    /// `subtotal - discount`; shipping and tax are added by the caller.
    pub grand_total: Money,
    pub applied_promotion: Option<AppliedPromotion>,

    /// Set in preview mode when a requested code was not applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PromotionError>,
}

impl PriceQuote {
    fn undiscounted(subtotal: Money, rejection: Option<PromotionError>) -> Self {
        Self {
            subtotal,
            discount: Money::zero(),
            grand_total: subtotal,
            applied_promotion: None,
            rejection,
        }
    }
}

/// Returns Σ unit_price × qty, or a validation error once it no longer
/// fits a stored money column.
pub fn subtotal(items: &[LineItem]) -> Result<Money, DomainError> {
    items
        .iter()
        .try_fold(Money::zero(), |sum, item| {
            item.unit_price
                .checked_times(item.qty)
                .and_then(|line| sum.checked_add(line))
                .filter(Money::is_storable)
        })
        .ok_or_else(|| {
            DomainError::Validation(format!(
                "subtotal exceeds the maximum amount of {}",
                Money::max_storable()
            ))
        })
}

/// Discount a rule grants on `subtotal`; never more than the subtotal.
pub fn discount_for(rule: &PricingRule, subtotal: Money) -> Money {
    let discount = match rule.rule_type {
        RuleType::Percentage => subtotal.percent(rule.value),
        RuleType::Fixed => Money::new(rule.value),
    };
    discount.min(subtotal)
}

/// Checks that a looked-up promotion can be redeemed at `now`.
pub fn validate_promotion<'a>(
    code: &str,
    found: Option<&'a PromotionWithRule>,
    now: DateTime<Utc>,
) -> Result<&'a PromotionWithRule, PromotionError> {
    let Some(found) = found else {
        return Err(PromotionError::NotFound(code.to_string()));
    };
    let promotion = &found.promotion;

    if !promotion.active || !found.rule.active {
        return Err(PromotionError::Inactive(promotion.code.clone()));
    }
    if !found.rule.is_active_at(now) {
        return Err(PromotionError::OutsideWindow(promotion.code.clone()));
    }
    if !promotion.is_available() {
        return Err(PromotionError::Exhausted(promotion.code.clone()));
    }
    Ok(found)
}

/// Prices `items`, applying `promotion` if one was requested.
pub fn resolve(
    items: &[LineItem],
    promotion: Option<PromotionRequest<'_>>,
    now: DateTime<Utc>,
    mode: ResolveMode,
) -> Result<PriceQuote, DomainError> {
    let subtotal = subtotal(items)?;
    let Some(request) = promotion else {
        return Ok(PriceQuote::undiscounted(subtotal, None));
    };

    match validate_promotion(request.code, request.found, now) {
        Ok(found) => {
            let discount = discount_for(&found.rule, subtotal);
            Ok(PriceQuote {
                subtotal,
                discount,
                grand_total: subtotal - discount,
                applied_promotion: Some(AppliedPromotion {
                    code: found.promotion.code.clone(),
                    rule_type: found.rule.rule_type,
                    value: found.rule.value,
                }),
                rejection: None,
            })
        }
        Err(err) if mode == ResolveMode::Preview => {
            Ok(PriceQuote::undiscounted(subtotal, Some(err)))
        }
        Err(err) => Err(err.into()),
    }
}
