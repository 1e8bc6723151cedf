//! Money value object in minor currency units.
//!
//! All billing arithmetic is integer arithmetic; floats never touch prices.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Percentage, ValidationError};

/// A non-negative amount in minor currency units (e.g. cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    /// Creates an amount, rejecting negative values.
    pub fn try_new(minor_units: i64) -> Result<Self, ValidationError> {
        if minor_units < 0 {
            return Err(ValidationError::out_of_range(
                "amount",
                0,
                i64::MAX,
                minor_units,
            ));
        }
        Ok(Self(minor_units))
    }

    /// Creates an amount from a compile-time catalog price.
    pub const fn from_minor(minor_units: u32) -> Self {
        Self(minor_units as i64)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Applies a percentage discount, rounding half up.
    ///
    /// `999` at 20% is `799.2`, which rounds to `799`.
    pub fn discounted(&self, discount: Percentage) -> Money {
        let keep = i128::from(discount.complement().value());
        Money::half_up_ratio(self.0, keep, 100)
    }

    /// `self * numerator / denominator`, rounded half up.
    ///
    /// A zero denominator yields zero.
    pub fn prorate(&self, numerator: i64, denominator: i64) -> Money {
        if denominator <= 0 || numerator <= 0 {
            return Money::ZERO;
        }
        Money::half_up_ratio(self.0, i128::from(numerator), i128::from(denominator))
    }

    fn half_up_ratio(value: i64, numerator: i128, denominator: i128) -> Money {
        let scaled = i128::from(value) * numerator * 2 + denominator;
        let rounded = scaled / (2 * denominator);
        Money(i64::try_from(rounded).unwrap_or(i64::MAX))
    }
}

impl TryFrom<i64> for Money {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<Money> for i64 {
    fn from(m: Money) -> Self {
        m.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
