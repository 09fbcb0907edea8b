//! Mil fixed-point values: [`Price`] and [`Quantity`].
//!
//! Both are stored as unsigned integer "mil" units (value × 1000). Nodes
//! compare and transmit the integers directly, so the same decimal value is
//! bit-identical on every node. Logic that needs decimal arithmetic reads the
//! value through [`Price::as_decimal`] / [`Quantity::as_decimal`].

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DexError, Result, constants};

/// Validate a signed mil integer coming off the wire.
fn checked_mil(field: &'static str, mil: i64) -> Result<u64> {
    u64::try_from(mil).map_err(|_| DexError::InvalidValue {
        field,
        reason: format!("negative value {mil}"),
    })
}

/// Convert a decimal to mil units, rejecting sub-mil precision.
fn decimal_to_mil(field: &'static str, value: Decimal) -> Result<u64> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DexError::InvalidValue {
            field,
            reason: format!("negative value {value}"),
        });
    }
    let scaled = value * Decimal::from(constants::MIL_SCALE);
    if scaled.fract() != Decimal::ZERO {
        return Err(DexError::InvalidValue {
            field,
            reason: format!(
                "{value} has more than {} fractional digits",
                constants::MIL_DECIMALS
            ),
        });
    }
    let mil = u64::try_from(scaled).map_err(|_| DexError::InvalidValue {
        field,
        reason: format!("{value} is out of range"),
    })?;
    if mil > constants::MAX_MIL {
        return Err(DexError::InvalidValue {
            field,
            reason: format!("{value} is out of range"),
        });
    }
    Ok(mil)
}

#[allow(clippy::cast_possible_wrap)]
fn mil_to_decimal(mil: u64) -> Decimal {
    // MAX_MIL == i64::MAX, so the cast never wraps.
    Decimal::new(mil as i64, constants::MIL_DECIMALS)
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// A price in mil units. Any valid tick carries a positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Price(u64);

impl Price {
    pub const ZERO: Self = Self(0);

    /// Build a price from its wire form.
    pub fn from_mil(mil: i64) -> Result<Self> {
        Ok(Self(checked_mil("price", mil)?))
    }

    /// Build a price from a decimal value (at most 3 fractional digits).
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        Ok(Self(decimal_to_mil("price", value)?))
    }

    /// The mil integer carried on the wire.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn mil(self) -> i64 {
        self.0 as i64
    }

    #[must_use]
    pub fn as_decimal(self) -> Decimal {
        mil_to_decimal(self.0)
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal().normalize())
    }
}

// ---------------------------------------------------------------------------
// Quantity
// ---------------------------------------------------------------------------

/// A non-negative quantity in mil units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Self = Self(0);

    /// Build a quantity from its wire form.
    pub fn from_mil(mil: i64) -> Result<Self> {
        Ok(Self(checked_mil("quantity", mil)?))
    }

    /// Build a quantity from a decimal value (at most 3 fractional digits).
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        Ok(Self(decimal_to_mil("quantity", value)?))
    }

    /// The mil integer carried on the wire.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn mil(self) -> i64 {
        self.0 as i64
    }

    #[must_use]
    pub fn as_decimal(self) -> Decimal {
        mil_to_decimal(self.0)
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self + rhs`, or `None` past [`constants::MAX_MIL`].
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_add(rhs.0)
            .filter(|v| *v <= constants::MAX_MIL)
            .map(Self)
    }

    /// `self - rhs`, or `None` if it would go negative.
    #[must_use]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// `self - rhs`, clamped at zero.
    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal().normalize())
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|q| q.0).fold(0u64, u64::saturating_add))
    }
}
