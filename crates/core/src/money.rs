//! Integer money and rate arithmetic.
//!
//! All monetary amounts are whole cents (`i64`); discount and VAT rates are
//! basis points. There is no floating point anywhere on the money path, so
//! pricing is deterministic and totals are exact sums.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// An amount in the smallest currency unit (cents).
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Checked multiplication by a unit count (e.g. line quantity).
    pub fn checked_mul(self, factor: i64) -> Option<Money> {
        self.0.checked_mul(factor).map(Money)
    }

    /// The portion of this amount at `rate`, rounded half away from zero to
    /// the nearest cent.
    ///
    /// Uses an `i128` intermediate so `amount × bps` cannot overflow.
    pub fn portion(self, rate: Rate) -> Money {
        let scale = i128::from(Rate::SCALE);
        let scaled = i128::from(self.0) * i128::from(rate.as_bps());
        let rounded = if scaled >= 0 {
            (scaled + scale / 2) / scale
        } else {
            (scaled - scale / 2) / scale
        };
        Money(rounded as i64)
    }

    /// This amount reduced by `rate` (e.g. a discount).
    ///
    /// Cannot overflow: the portion of a `Rate` (≤ 100%) never exceeds the
    /// amount itself in magnitude.
    pub fn less(self, rate: Rate) -> Money {
        Money(self.0 - self.portion(rate).0)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl ValueObject for Money {}

/// A percentage expressed in basis points (1/100th of a percent).
///
/// Bounded to `[0, 10_000]` (0–100%). Out-of-range input is a validation
/// error at the point of construction, never a silent clamp: a firm record
/// carrying a 130% discount is bad data, not a 100% discount.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// Basis points in 100%.
    pub const SCALE: u32 = 10_000;

    pub const ZERO: Rate = Rate(0);

    pub fn from_bps(bps: u32) -> DomainResult<Rate> {
        if bps > Self::SCALE {
            return Err(DomainError::validation(format!(
                "rate must be between 0 and {} basis points, got {bps}",
                Self::SCALE
            )));
        }
        Ok(Rate(bps))
    }

    pub fn from_percent(percent: u32) -> DomainResult<Rate> {
        if percent > 100 {
            return Err(DomainError::validation(format!(
                "percentage must be between 0 and 100, got {percent}"
            )));
        }
        Ok(Rate(percent * 100))
    }

    pub const fn as_bps(self) -> u32 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for Rate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

impl ValueObject for Rate {}
