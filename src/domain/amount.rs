//! Raw on-chain token amounts.
//!
//! Upstream payloads carry amounts as string-encoded integers in the token's
//! smallest unit. They are held as `U256` and converted to display decimals
//! exactly once, when the normalizer builds operations.

use super::Decimal;
use primitive_types::U256;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Highest scale `rust_decimal` can represent.
const MAX_SCALE: u8 = 28;

/// `10^77` is the largest power of ten a `U256` holds.
const MAX_DECIMALS: u8 = 77;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid integer amount: {0}")]
    InvalidInteger(String),
    #[error("invalid decimal amount: {0}")]
    InvalidDecimal(String),
    #[error("negative amount: {0}")]
    Negative(String),
    #[error("amount {0} does not fit the decimal range")]
    Overflow(String),
}

/// Unsigned integer amount in a token's smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawAmount(U256);

impl RawAmount {
    pub fn new(raw: U256) -> Self {
        RawAmount(raw)
    }

    pub fn zero() -> Self {
        RawAmount(U256::zero())
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a base-10 integer string such as `"1500000000000000000"`.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(AmountError::Negative(trimmed.to_string()));
        }
        U256::from_dec_str(trimmed)
            .map(RawAmount)
            .map_err(|_| AmountError::InvalidInteger(trimmed.to_string()))
    }

    /// Scale a display amount (e.g. `"12.5"`) back to raw units.
    ///
    /// Digits beyond `decimals` fractional places are truncated, matching how
    /// the token itself cannot represent them.
    pub fn from_display(s: &str, decimals: u8) -> Result<Self, AmountError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(AmountError::Negative(trimmed.to_string()));
        }

        let plain = if trimmed.contains(['e', 'E']) {
            RustDecimal::from_scientific(trimmed)
                .map_err(|_| AmountError::InvalidDecimal(trimmed.to_string()))?
                .to_string()
        } else {
            trimmed.to_string()
        };

        let (int_part, frac_part) = match plain.split_once('.') {
            Some((i, f)) => (i, f),
            None => (plain.as_str(), ""),
        };
        let digits_ok = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !digits_ok(int_part) || !digits_ok(frac_part) {
            return Err(AmountError::InvalidDecimal(trimmed.to_string()));
        }

        let scale = decimals as usize;
        let mut frac: String = frac_part.chars().take(scale).collect();
        while frac.len() < scale {
            frac.push('0');
        }
        let combined = format!("{}{}", int_part, frac);
        let combined = combined.trim_start_matches('0');
        if combined.is_empty() {
            return Ok(RawAmount::zero());
        }
        U256::from_dec_str(combined)
            .map(RawAmount)
            .map_err(|_| AmountError::Overflow(trimmed.to_string()))
    }

    /// Convert to display units by dividing by `10^decimals`.
    pub fn to_decimal(&self, decimals: u8) -> Result<Decimal, AmountError> {
        let overflow = || AmountError::Overflow(self.0.to_string());
        if decimals > MAX_DECIMALS {
            return Err(overflow());
        }
        let divisor = U256::exp10(decimals as usize);
        let whole = self.0 / divisor;
        let mut frac = self.0 % divisor;
        let mut scale = decimals;
        if scale > MAX_SCALE {
            frac /= U256::exp10((scale - MAX_SCALE) as usize);
            scale = MAX_SCALE;
        }

        if whole.bits() > 96 {
            return Err(overflow());
        }
        let whole = RustDecimal::from_u128(whole.as_u128()).ok_or_else(overflow)?;
        // frac < 10^28 < 2^96, always representable.
        let frac = RustDecimal::from_i128_with_scale(frac.as_u128() as i128, scale as u32);
        whole.checked_add(frac).map(Decimal::new).ok_or_else(overflow)
    }

    pub fn checked_mul(&self, rhs: RawAmount) -> Option<RawAmount> {
        self.0.checked_mul(rhs.0).map(RawAmount)
    }

    pub fn checked_add(&self, rhs: RawAmount) -> Option<RawAmount> {
        self.0.checked_add(rhs.0).map(RawAmount)
    }
}

impl fmt::Display for RawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RawAmount {
    fn from(value: u64) -> Self {
        RawAmount(U256::from(value))
    }
}
