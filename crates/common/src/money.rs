//! Fixed-point money with banker's rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount with two-decimal precision.
///
/// Arithmetic is exact (backed by [`Decimal`]); rounding to the
/// two-decimal wire representation happens explicitly via [`Money::round2`]
/// and always uses half-to-even tie-breaking, so `.125` rounds to `.12`
/// and `.135` rounds to `.14`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a money amount from a raw decimal, without rounding.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a money amount from an integral number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal amount.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Rounds to two decimals using banker's rounding (half-to-even).
    ///
    /// The result always carries scale 2 (`47.5` becomes `47.50`), so the
    /// wire form and the signature input are stable.
    pub fn round2(&self) -> Money {
        let mut rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        rounded.rescale(2);
        Self(rounded)
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_from_cents() {
        assert_eq!(Money::from_cents(1234).amount(), dec("12.34"));
        assert_eq!(Money::from_cents(5).amount(), dec("0.05"));
    }

    #[test]
    fn test_round2_half_to_even_rounds_down() {
        // .125 has an even digit (2) before the tie, so it stays.
        assert_eq!(Money::new(dec("0.125")).round2().amount(), dec("0.12"));
        assert_eq!(Money::new(dec("2.125")).round2().amount(), dec("2.12"));
    }

    #[test]
    fn test_round2_half_to_even_rounds_up() {
        // .135 has an odd digit (3) before the tie, so it rounds up.
        assert_eq!(Money::new(dec("0.135")).round2().amount(), dec("0.14"));
        assert_eq!(Money::new(dec("7.135")).round2().amount(), dec("7.14"));
    }

    #[test]
    fn test_round2_non_tie_behaves_normally() {
        assert_eq!(Money::new(dec("1.126")).round2().amount(), dec("1.13"));
        assert_eq!(Money::new(dec("1.124")).round2().amount(), dec("1.12"));
    }

    #[test]
    fn test_round2_preserves_two_decimal_scale() {
        assert_eq!(Money::new(dec("47.5")).round2().to_string(), "47.50");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::new(dec("10.00"));
        let b = Money::new(dec("2.50"));
        assert_eq!((a + b).amount(), dec("12.50"));
        assert_eq!((a - b).amount(), dec("7.50"));
        assert_eq!(b.multiply(4).amount(), dec("10.00"));
    }

    #[test]
    fn test_sum() {
        let total: Money = vec![
            Money::new(dec("1.10")),
            Money::new(dec("2.20")),
            Money::new(dec("3.30")),
        ]
        .into_iter()
        .sum();
        assert_eq!(total.amount(), dec("6.60"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let money = Money::new(dec("19.99"));
        let json = serde_json::to_string(&money).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, back);
    }

    #[test]
    fn test_deserializes_from_json_number() {
        // Catalog prices arrive as plain JSON numbers.
        let money: Money = serde_json::from_str("10.5").unwrap();
        assert_eq!(money.amount(), dec("10.5"));
    }
}
