//! Decimal amounts: parsing, validation, rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;

use crate::config::AMOUNT_SCALE;

/// Every amount in Quintet. 96-bit mantissa, up to 28 fractional digits.
pub type Amount = Decimal;

/// Why an amount was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Not a decimal number at all (`"abc"`, `"NaN"`, `"1e400"`).
    #[error("not a decimal amount: {0}")]
    Malformed(String),

    /// Zero or negative where a positive amount is required.
    #[error("amount must be positive, got {0}")]
    NotPositive(Decimal),
}

/// Parses a user-supplied amount string and requires it to be `> 0`.
///
/// Accepts plain and scientific notation (`"0.00001"`, `"1e-5"`). There is
/// no NaN or infinity in `Decimal`, so "non-finite" input fails as malformed.
pub fn parse_amount(input: &str) -> Result<Amount, AmountError> {
    let trimmed = input.trim();
    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| AmountError::Malformed(input.to_string()))?;
    ensure_positive(value)
}

/// Returns `amount` unchanged if it is strictly positive.
pub fn ensure_positive(amount: Amount) -> Result<Amount, AmountError> {
    if amount <= Decimal::ZERO {
        return Err(AmountError::NotPositive(amount));
    }
    Ok(amount)
}

/// Rounds a computed credit toward zero at [`AMOUNT_SCALE`] digits.
pub fn round_credit(amount: Amount) -> Amount {
    amount
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero)
        .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_scientific() {
        assert_eq!(parse_amount("99.4").unwrap(), Decimal::new(994, 1));
        assert_eq!(parse_amount("1e-5").unwrap(), Decimal::new(1, 5));
        assert_eq!(parse_amount(" 0.0005 ").unwrap(), Decimal::new(5, 4));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_amount("abc"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_amount("NaN"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_amount(""), Err(AmountError::Malformed(_))));
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(matches!(parse_amount("0"), Err(AmountError::NotPositive(_))));
        assert!(matches!(parse_amount("-3"), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn round_credit_truncates() {
        let third = Decimal::ONE / Decimal::from(3);
        assert_eq!(round_credit(third), Decimal::new(333_333_333_333, 12));
        assert_eq!(round_credit(Decimal::new(9940, 1)), Decimal::from(994));
    }
}
