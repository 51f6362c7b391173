//! Fixed-point currency amounts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Base units per whole coin (8 decimal places).
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// Non-negative amount stored as integer base units.
///
/// Integer storage keeps the signed encoding identical on every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Convert a decimal coin value, rounding to the nearest base unit.
    ///
    /// Returns `None` for negative, NaN, infinite or out-of-range values.
    pub fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let units = (value * UNITS_PER_COIN as f64).round();
        if units >= u64::MAX as f64 {
            return None;
        }
        Some(Self(units as u64))
    }

    pub const fn units(&self) -> u64 {
        self.0
    }

    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / UNITS_PER_COIN as f64
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / UNITS_PER_COIN, self.0 % UNITS_PER_COIN)
    }
}
