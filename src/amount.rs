use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monetary amount in major currency units, backed by a fixed-point decimal.
///
/// Amounts carry at most [`Amount::SCALE`] decimal places once they have gone
/// through [`Amount::round`]; the engine never touches floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

/// A fractional rate such as a platform fee (`0.03`) or a revenue share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Amount {
    /// Decimal places kept for stored amounts (minor units).
    pub const SCALE: u32 = 2;

    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Amount(value)
    }

    /// Build an amount from integer minor units (cents).
    pub fn from_minor(minor: i64) -> Self {
        Amount(Decimal::new(minor, Self::SCALE))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Round to minor units, half away from zero.
    pub fn round(self) -> Self {
        Amount(
            self.0
                .round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Integer minor units as expected by the payment provider.
    ///
    /// Returns `None` if the amount has sub-minor precision or overflows `i64`.
    pub fn to_minor(&self) -> Option<i64> {
        let scaled = self.0.checked_mul(Decimal::from(10_i64.pow(Self::SCALE)))?;
        if scaled.fract() != Decimal::ZERO {
            return None;
        }
        scaled.to_i64()
    }

    /// Multiply by a rate, rounded to minor units.
    pub fn apply_rate(self, rate: Rate) -> Self {
        Amount(self.0 * rate.0).round()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Sum of `amounts`, or `None` if it leaves the decimal range.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Self>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Rate(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Whether the rate lies in `[0, 1]`.
    pub fn is_fraction(&self) -> bool {
        self.0 >= Decimal::ZERO && self.0 <= Decimal::ONE
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Amount)
    }
}

impl FromStr for Rate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Rate)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Saturates at the decimal range; use [`Amount::checked_sum`] where the total is booked.
impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
    }
}
