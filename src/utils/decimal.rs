//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Truncate a decimal toward zero to a specific number of decimal places.
///
/// Used wherever rounding must never produce an amount larger in magnitude
/// than the computed one.
pub fn truncate(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// An on-chain integer token amount.
///
/// Wider than `Decimal` (whose mantissa is 96 bits): 18-decimal tokens
/// exceed it above roughly 79 billion units. Serialized as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeAmount(pub u128);

impl NativeAmount {
    pub const ZERO: NativeAmount = NativeAmount(0);
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for NativeAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NativeAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map(NativeAmount)
            .map_err(|e| serde::de::Error::custom(format!("invalid native amount {:?}: {}", raw, e)))
    }
}

/// Scale a token amount to whole native units, truncating any fraction of
/// the smallest unit.
///
/// Works on the mantissa directly so the result is not bounded by
/// `Decimal`'s range. `None` for negative amounts or if the result does not
/// fit in a `u128`.
pub fn to_native_units(amount: Decimal, decimals: u32) -> Option<NativeAmount> {
    if amount < Decimal::ZERO {
        return None;
    }

    let mantissa = u128::try_from(amount.mantissa()).ok()?;
    let scale = amount.scale();

    let units = if decimals >= scale {
        mantissa.checked_mul(10u128.checked_pow(decimals - scale)?)?
    } else {
        mantissa / 10u128.checked_pow(scale - decimals)?
    };

    Some(NativeAmount(units))
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}
