//! Currency amounts and overflow-aware addition.

use crate::core::{Result, TallyError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest magnitude the `nanos` field may hold
pub const MAX_NANOS: i32 = 999_999_999;

const BILLION: i64 = 1_000_000_000;

/// An amount of money in one currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Three-letter ISO 4217 code
    pub currency_code: String,
    /// Whole units
    pub units: i64,
    /// Billionths of a unit, same sign as `units`
    pub nanos: i32,
}

impl Money {
    pub fn new<S: Into<String>>(currency_code: S, units: i64, nanos: i32) -> Self {
        Self {
            currency_code: currency_code.into(),
            units,
            nanos,
        }
    }

    /// -1, 0 or 1
    pub fn signum(&self) -> i32 {
        if self.units != 0 {
            self.units.signum() as i32
        } else {
            self.nanos.signum()
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{:09}", self.currency_code, self.units, self.nanos.unsigned_abs())
    }
}

/// Fails unless the amount is well formed
pub fn check_valid(money: &Money) -> Result<()> {
    if money.currency_code.chars().count() != 3 {
        return Err(TallyError::validation(format!(
            "the currency code is not 3 letters long: {:?}",
            money.currency_code
        )));
    }
    if (money.units > 0 && money.nanos < 0) || (money.units < 0 && money.nanos > 0) {
        return Err(TallyError::validation("the signs of the units and nanos do not match"));
    }
    if money.nanos.unsigned_abs() > MAX_NANOS.unsigned_abs() {
        return Err(TallyError::validation(format!(
            "the nanos field must be between {} and {}",
            -MAX_NANOS, MAX_NANOS
        )));
    }
    Ok(())
}

/// Adds two amounts of the same currency.
///
/// A sum that does not fit in `i64` units fails with `Overflow`, or
/// saturates to the largest representable amount of the right sign when
/// `allow_overflow` is set.
pub fn add(a: &Money, b: &Money, allow_overflow: bool) -> Result<Money> {
    check_valid(a)?;
    check_valid(b)?;
    if a.currency_code != b.currency_code {
        return Err(TallyError::validation(format!(
            "money values need the same currency to be summed: {} vs {}",
            a.currency_code, b.currency_code
        )));
    }

    let (nano_carry, mut nanos_sum) = sum_nanos(a.nanos, b.nanos);
    let mut units_sum = i128::from(a.units) + i128::from(b.units) + i128::from(nano_carry);

    if units_sum > 0 && nanos_sum < 0 {
        units_sum -= 1;
        nanos_sum += BILLION;
    } else if units_sum < 0 && nanos_sum > 0 {
        units_sum += 1;
        nanos_sum -= BILLION;
    }

    if units_sum > i128::from(i64::MAX) {
        if !allow_overflow {
            return Err(TallyError::overflow("money addition positive overflow"));
        }
        return Ok(Money::new(a.currency_code.clone(), i64::MAX, MAX_NANOS));
    }
    if units_sum < i128::from(i64::MIN) {
        if !allow_overflow {
            return Err(TallyError::overflow("money addition negative overflow"));
        }
        return Ok(Money::new(a.currency_code.clone(), i64::MIN, -MAX_NANOS));
    }

    // Both values are range-checked above and by the carry arithmetic.
    Ok(Money::new(
        a.currency_code.clone(),
        units_sum as i64,
        nanos_sum as i32,
    ))
}

fn sum_nanos(a: i32, b: i32) -> (i64, i64) {
    let sum = i64::from(a) + i64::from(b);
    if sum >= BILLION {
        (1, sum - BILLION)
    } else if sum <= -BILLION {
        (-1, sum + BILLION)
    } else {
        (0, sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(units: i64, nanos: i32) -> Money {
        Money::new("USD", units, nanos)
    }

    #[test]
    fn test_check_valid() {
        assert!(check_valid(&usd(1, 5)).is_ok());
        assert!(check_valid(&usd(-1, -5)).is_ok());
        assert!(check_valid(&Money::new("US", 1, 0)).is_err());
        assert!(check_valid(&usd(1, -5)).is_err());
        assert!(check_valid(&usd(-1, 5)).is_err());
        assert!(check_valid(&usd(0, 1_000_000_000)).is_err());
    }

    #[test]
    fn test_add_with_carry() {
        let sum = add(&usd(1, 600_000_000), &usd(2, 500_000_000), false).unwrap();
        assert_eq!(sum, usd(4, 100_000_000));

        let exact = add(&usd(0, 500_000_000), &usd(0, 500_000_000), false).unwrap();
        assert_eq!(exact, usd(1, 0));
    }

    #[test]
    fn test_add_mixed_signs() {
        let sum = add(&usd(3, 0), &usd(-1, -500_000_000), false).unwrap();
        assert_eq!(sum, usd(1, 500_000_000));

        let sum = add(&usd(-3, 0), &usd(1, 250_000_000), false).unwrap();
        assert_eq!(sum, usd(-1, -750_000_000));
    }

    #[test]
    fn test_add_rejects_currency_mismatch() {
        let err = add(&usd(1, 0), &Money::new("EUR", 1, 0), false).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_positive_overflow() {
        let a = usd(i64::MAX, 600_000_000);
        let b = usd(0, 500_000_000);

        let err = add(&a, &b, false).unwrap_err();
        assert_eq!(err.category(), "overflow");

        let saturated = add(&a, &b, true).unwrap();
        assert_eq!(saturated, usd(i64::MAX, MAX_NANOS));
    }

    #[test]
    fn test_negative_overflow() {
        let a = usd(i64::MIN, -600_000_000);
        let b = usd(-1, 0);

        assert!(add(&a, &b, false).is_err());
        assert_eq!(add(&a, &b, true).unwrap(), usd(i64::MIN, -MAX_NANOS));
    }

    #[test]
    fn test_largest_representable_sum_is_not_overflow() {
        let sum = add(&usd(i64::MAX, 0), &usd(0, 1), false).unwrap();
        assert_eq!(sum, usd(i64::MAX, 1));
    }
}
