//! Exact decimal token amounts.
//!
//! Amounts are kept as an integer mantissa plus a decimal scale, so "0.05" is
//! `5 × 10⁻²`. Parsing, comparison, and summation are integer-only; no `f64`
//! anywhere. Conversion to a token's smallest unit multiplies by
//! `10^(decimals - scale)`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AmountError;

/// Largest scale accepted from text; 10^36 leaves ample headroom in a U256.
pub const MAX_SCALE: u8 = 36;

/// Non-negative decimal amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct Amount {
    mantissa: U256,
    scale: u8,
}

/// 10^exp, exact for every exponent a U256 can hold (≤ 77).
fn pow10(exp: u8) -> U256 {
    U256::from(10u64)
        .checked_pow(U256::from(exp))
        .unwrap_or(U256::MAX)
}

impl Amount {
    pub const ZERO: Amount = Amount {
        mantissa: U256::ZERO,
        scale: 0,
    };

    /// `mantissa / 10^scale`, usable in constants.
    pub const fn from_parts(mantissa: u64, scale: u8) -> Self {
        Self {
            mantissa: U256::from_limbs([mantissa, 0, 0, 0]),
            scale,
        }
    }

    /// Wrap a smallest-unit integer, e.g. a `balanceOf` result.
    pub fn from_units(units: U256, decimals: u8) -> Self {
        Self {
            mantissa: units,
            scale: decimals,
        }
        .normalized()
    }

    /// Scale into the token's smallest unit.
    ///
    /// Fails if the amount has more significant decimal places than the token.
    pub fn to_units(&self, decimals: u8) -> Result<U256, AmountError> {
        let n = self.normalized();
        if n.scale > decimals {
            return Err(AmountError::TooPrecise(n.to_string(), decimals));
        }
        n.mantissa
            .checked_mul(pow10(decimals - n.scale))
            .ok_or(AmountError::Overflow)
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        let scale = self.scale.max(other.scale);
        let a = self.rescaled(scale)?;
        let b = other.rescaled(scale)?;
        Some(
            Amount {
                mantissa: a.checked_add(b)?,
                scale,
            }
            .normalized(),
        )
    }

    /// Sum a sequence of amounts. Saturates at the largest representable
    /// mantissa rather than failing.
    pub fn sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Amount {
        amounts.into_iter().fold(Amount::ZERO, |acc, a| {
            acc.checked_add(a).unwrap_or(Amount {
                mantissa: U256::MAX,
                scale: acc.scale.max(a.scale),
            })
        })
    }

    /// Integer and fractional parts of the mantissa.
    fn split(&self) -> (U256, U256) {
        let unit = pow10(self.scale);
        (self.mantissa / unit, self.mantissa % unit)
    }

    fn rescaled(&self, scale: u8) -> Option<U256> {
        self.mantissa.checked_mul(pow10(scale - self.scale))
    }

    /// Strip trailing fractional zeros.
    fn normalized(self) -> Self {
        let ten = U256::from(10u64);
        let mut n = self;
        if n.mantissa.is_zero() {
            return Amount::ZERO;
        }
        while n.scale > 0 && (n.mantissa % ten).is_zero() {
            n.mantissa /= ten;
            n.scale -= 1;
        }
        n
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty(s.to_string()));
        }
        if trimmed.starts_with('-') {
            return Err(AmountError::Malformed(s.to_string(), "negative amount"));
        }

        let (integer_part, fractional_part) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };
        if integer_part.is_empty() && fractional_part.is_empty() {
            return Err(AmountError::Empty(s.to_string()));
        }
        if !integer_part.chars().all(|c| c.is_ascii_digit())
            || !fractional_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::Malformed(s.to_string(), "unexpected character"));
        }
        if fractional_part.len() > MAX_SCALE as usize {
            return Err(AmountError::TooPrecise(s.to_string(), MAX_SCALE));
        }

        let digits = format!("{integer_part}{fractional_part}");
        let digits = digits.trim_start_matches('0');
        let mantissa = if digits.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(digits, 10).map_err(|_| AmountError::Overflow)?
        };

        Ok(Amount {
            mantissa,
            scale: fractional_part.len() as u8,
        }
        .normalized())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.normalized();
        let digits = n.mantissa.to_string();
        let scale = n.scale as usize;
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_int, a_frac) = self.split();
        let (b_int, b_frac) = other.split();
        a_int.cmp(&b_int).then_with(|| {
            // Fractions are below 10^scale, so lifting them to the common
            // scale cannot overflow.
            let scale = self.scale.max(other.scale);
            let a = a_frac * pow10(scale - self.scale);
            let b = b_frac * pow10(scale - other.scale);
            a.cmp(&b)
        })
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Amount {}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
