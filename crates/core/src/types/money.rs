//! Money helpers built on `rust_decimal`.
//!
//! All stored amounts are `NUMERIC(12,2)`; these helpers keep in-process
//! arithmetic on the same two-decimal grid.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency used for carts and orders unless stated otherwise.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Round an amount to cents (half away from zero).
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount the way payment providers expect it (`"12.50"`).
#[must_use]
pub fn to_provider_value(amount: Decimal) -> String {
    let mut value = round_money(amount);
    value.rescale(2);
    value.to_string()
}

/// `percent` percent of `amount`, rounded to cents.
#[must_use]
pub fn percent_off(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

/// Whole-number markdown of `price` relative to `compare_price`.
///
/// Returns 0 unless `compare_price` is greater than `price`. The fraction
/// is truncated, so 33.9% reports as 33.
#[must_use]
pub fn markdown_percentage(price: Decimal, compare_price: Option<Decimal>) -> u32 {
    match compare_price {
        Some(compare) if compare > price && compare > Decimal::ZERO => {
            ((compare - price) / compare * Decimal::ONE_HUNDRED)
                .trunc()
                .to_u32()
                .unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(d("10.005")), d("10.01"));
        assert_eq!(round_money(d("10.004")), d("10.00"));
        assert_eq!(round_money(d("-3.335")), d("-3.34"));
    }

    #[test]
    fn test_provider_value_always_has_two_decimals() {
        assert_eq!(to_provider_value(d("10")), "10.00");
        assert_eq!(to_provider_value(d("59.9")), "59.90");
        assert_eq!(to_provider_value(d("0.125")), "0.13");
    }

    #[test]
    fn test_percent_off() {
        assert_eq!(percent_off(d("80.00"), d("15")), d("12.00"));
        assert_eq!(percent_off(d("19.99"), d("10")), d("2.00"));
    }

    #[test]
    fn test_markdown_percentage_truncates() {
        assert_eq!(markdown_percentage(d("66.10"), Some(d("100.00"))), 33);
        assert_eq!(markdown_percentage(d("75.00"), Some(d("100.00"))), 25);
    }

    #[test]
    fn test_markdown_percentage_without_discount() {
        assert_eq!(markdown_percentage(d("100.00"), None), 0);
        assert_eq!(markdown_percentage(d("100.00"), Some(d("100.00"))), 0);
        assert_eq!(markdown_percentage(d("100.00"), Some(d("90.00"))), 0);
    }
}
