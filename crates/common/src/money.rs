//! Exact decimal money.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

/// Number of fractional digits every amount is carried at.
pub const MONEY_SCALE: u32 = 2;

/// A monetary amount held as an exact decimal at two fractional digits.
///
/// Construction rounds with banker's rounding (half-even) so that every
/// amount in the system is quantized the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates an amount from a decimal, quantizing it to two places.
    pub fn new(amount: Decimal) -> Self {
        let mut amount =
            amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven);
        amount.rescale(MONEY_SCALE);
        Self(amount)
    }

    /// Creates an amount from minor units (e.g. 1050 = 10.50).
    pub fn from_minor(minor: i64) -> Self {
        Self::new(Decimal::new(minor, MONEY_SCALE))
    }

    /// Returns zero.
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiplies by a quantity.
    pub fn times(&self, qty: i64) -> Money {
        Money::new(self.0 * Decimal::from(qty))
    }

    /// Returns `percent`% of this amount, rounded half-even to two places.
    pub fn percent(&self, percent: Decimal) -> Money {
        Money::new(self.0 * percent / Decimal::ONE_HUNDRED)
    }

    /// Largest amount a stored column holds (`NUMERIC(12, 2)`).
    pub fn max_storable() -> Self {
        Self(Decimal::new(999_999_999_999, MONEY_SCALE))
    }

    /// Returns true if the amount fits a stored money column.
    pub fn is_storable(&self) -> bool {
        self.0.abs() <= Self::max_storable().0
    }

    /// Multiplies by a quantity, or `None` on decimal overflow.
    pub fn checked_times(&self, qty: i64) -> Option<Money> {
        self.0.checked_mul(Decimal::from(qty)).map(Money::new)
    }

    /// Adds two amounts, or `None` on decimal overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money::new)
    }

    /// Returns the smaller of two amounts.
    pub fn min(self, other: Money) -> Money {
        if other < self { other } else { self }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Money::new)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
