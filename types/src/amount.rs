//! Conversion between human token amounts and raw on-chain units.
//!
//! Deposit records carry human amounts as [`Decimal`]; orders and chain calls
//! use raw integer units (`u128`) so no rounding happens after conversion.

use rust_decimal::Decimal;

use crate::TypesError;

/// Convert a human amount into raw units, truncating digits beyond `decimals`.
pub fn to_raw(amount: Decimal, decimals: u32) -> Result<u128, TypesError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(TypesError::InvalidAmount(amount.to_string()));
    }
    let mantissa = amount.mantissa().unsigned_abs();
    let scale = amount.scale();
    if decimals >= scale {
        10u128
            .checked_pow(decimals - scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(|| TypesError::AmountOverflow {
                raw: amount.to_string(),
                decimals,
            })
    } else {
        // scale never exceeds 28, so the divisor always fits.
        Ok(mantissa / 10u128.pow(scale - decimals))
    }
}

/// Convert raw units back into a human amount.
pub fn from_raw(raw: u128, decimals: u32) -> Result<Decimal, TypesError> {
    let overflow = || TypesError::AmountOverflow {
        raw: raw.to_string(),
        decimals,
    };
    let mantissa = i128::try_from(raw).map_err(|_| overflow())?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map(|d| d.normalize())
        .map_err(|_| overflow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn to_raw_scales_up() {
        let amount = Decimal::from_str("100.5").unwrap();
        assert_eq!(to_raw(amount, 6).unwrap(), 100_500_000);
    }

    #[test]
    fn to_raw_truncates_excess_precision() {
        let amount = Decimal::from_str("1.1234567").unwrap();
        assert_eq!(to_raw(amount, 6).unwrap(), 1_123_456);
    }

    #[test]
    fn to_raw_handles_eighteen_decimals() {
        let amount = Decimal::from_str("0.01").unwrap();
        assert_eq!(to_raw(amount, 18).unwrap(), 10_000_000_000_000_000);
    }

    #[test]
    fn to_raw_rejects_negative() {
        let amount = Decimal::from_str("-1").unwrap();
        assert!(matches!(to_raw(amount, 6), Err(TypesError::InvalidAmount(_))));
    }

    #[test]
    fn from_raw_renders_human_amount() {
        let human = from_raw(50_000_000, 6).unwrap();
        assert_eq!(human, Decimal::from(50));
    }

    #[test]
    fn from_raw_rejects_oversized_mantissa() {
        assert!(from_raw(u128::MAX, 18).is_err());
    }
}
