//! Money amounts in the smallest currency unit.

use serde::{Deserialize, Serialize};

/// A money amount in the smallest currency unit (whole rupiah).
///
/// Amounts are integers end to end: catalog prices, admin fees, order totals
/// and the gross amount sent to the payment gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        if self.0 < 0 {
            write!(f, "-Rp{grouped}")
        } else {
            write!(f, "Rp{grouped}")
        }
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}
