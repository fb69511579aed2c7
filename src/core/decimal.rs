use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Digits of precision kept when a division does not terminate.
const MAX_DIGITS: u32 = 34;

/// Exponent range of an IEEE 754 decimal128.
pub const MIN_EXPONENT: i32 = -6176;
pub const MAX_EXPONENT: i32 = 6111;

/// High-precision decimal number: `coefficient * 10^exponent`.
///
/// Values are kept normalized (no trailing zeros in the coefficient, zero has
/// exponent 0), so structural equality is numeric equality. The normalized
/// exponent always lies in `MIN_EXPONENT..=MAX_EXPONENT`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decimal128 {
    coefficient: i128,
    exponent: i32,
}

impl Decimal128 {
    pub const ZERO: Decimal128 = Decimal128 {
        coefficient: 0,
        exponent: 0,
    };

    /// `coefficient * 10^exponent`. Fails with `TypeMismatch` when the
    /// normalized exponent is outside the decimal128 range.
    pub fn new(coefficient: i128, exponent: i32) -> Result<Self> {
        Self::from_parts(coefficient, i64::from(exponent))
    }

    fn from_parts(mut coefficient: i128, mut exponent: i64) -> Result<Self> {
        if coefficient == 0 {
            return Ok(Self::ZERO);
        }
        // An i128 has at most 39 digits, so this cannot overflow an i64
        while coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        match i32::try_from(exponent) {
            Ok(exponent) if (MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) => Ok(Self {
                coefficient,
                exponent,
            }),
            _ => Err(DbError::TypeMismatch(format!(
                "Decimal exponent {} is outside {}..={}",
                exponent, MIN_EXPONENT, MAX_EXPONENT
            ))),
        }
    }

    pub fn coefficient(&self) -> i128 {
        self.coefficient
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient == 0
    }

    /// Rescale both operands to the smaller exponent.
    fn aligned(&self, other: &Self) -> Option<(i128, i128, i32)> {
        let exponent = self.exponent.min(other.exponent);
        let lhs = scale_up(self.coefficient, self.exponent.checked_sub(exponent)?)?;
        let rhs = scale_up(other.coefficient, other.exponent.checked_sub(exponent)?)?;
        Some((lhs, rhs, exponent))
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let (lhs, rhs, exponent) = self.aligned(other)?;
        Self::new(lhs.checked_add(rhs)?, exponent).ok()
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let (lhs, rhs, exponent) = self.aligned(other)?;
        Self::new(lhs.checked_sub(rhs)?, exponent).ok()
    }

    /// Divide by a non-zero integer, keeping up to 34 significant digits.
    pub fn checked_div_int(&self, divisor: i64) -> Option<Self> {
        let divisor = i128::from(divisor);
        let mut coefficient = self.coefficient;
        let mut exponent = i64::from(self.exponent);
        while coefficient.checked_rem(divisor)? != 0 && digits(coefficient) < MAX_DIGITS {
            match coefficient.checked_mul(10) {
                Some(scaled) => {
                    coefficient = scaled;
                    exponent -= 1;
                }
                None => break,
            }
        }
        Self::from_parts(coefficient.checked_div(divisor)?, exponent).ok()
    }

    pub fn to_f64(&self) -> f64 {
        // Scientific form keeps the text short for any exponent
        format!("{}e{}", self.coefficient, self.exponent)
            .parse::<f64>()
            .unwrap_or(f64::NAN)
    }

    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(DbError::TypeMismatch(format!(
                "Cannot represent {} as a decimal",
                value
            )));
        }
        format!("{}", value).parse()
    }
}

fn scale_up(coefficient: i128, by: i32) -> Option<i128> {
    coefficient.checked_mul(10i128.checked_pow(u32::try_from(by).ok()?)?)
}

fn digits(mut value: i128) -> u32 {
    let mut count = 1;
    while value / 10 != 0 {
        value /= 10;
        count += 1;
    }
    count
}

impl PartialEq for Decimal128 {
    fn eq(&self, other: &Self) -> bool {
        self.coefficient == other.coefficient && self.exponent == other.exponent
    }
}

impl Eq for Decimal128 {}

impl Ord for Decimal128 {
    fn cmp(&self, other: &Self) -> Ordering {
        let sign = self.coefficient.signum().cmp(&other.coefficient.signum());
        if sign != Ordering::Equal || self.coefficient == 0 {
            return sign;
        }
        match self.aligned(other) {
            Some((lhs, rhs, _)) => lhs.cmp(&rhs),
            // Alignment overflowed: the operand with the larger exponent has the
            // larger magnitude.
            None => {
                let magnitude = self.exponent.cmp(&other.exponent);
                if self.coefficient > 0 {
                    magnitude
                } else {
                    magnitude.reverse()
                }
            }
        }
    }
}

impl PartialOrd for Decimal128 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Decimal128 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.coefficient.hash(state);
        self.exponent.hash(state);
    }
}

impl Default for Decimal128 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for Decimal128 {
    fn from(mut value: i64) -> Self {
        if value == 0 {
            return Self::ZERO;
        }
        // At most 18 trailing zeros, well inside the exponent range
        let mut exponent = 0;
        while value % 10 == 0 {
            value /= 10;
            exponent += 1;
        }
        Self {
            coefficient: i128::from(value),
            exponent,
        }
    }
}

impl FromStr for Decimal128 {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DbError::TypeMismatch(format!("'{}' is not a valid decimal", s));
        let trimmed = s.trim();
        let (mantissa, exp_part) = match trimmed.find(['e', 'E']) {
            Some(pos) => (&trimmed[..pos], Some(&trimmed[pos + 1..])),
            None => (trimmed, None),
        };
        let exponent: i64 = match exp_part {
            Some(e) => e.parse().map_err(|_| invalid())?,
            None => 0,
        };

        let (negative, digits_part) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int_part, frac_part) = match digits_part.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits_part, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let mut coefficient: i128 = 0;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let digit = ch.to_digit(10).ok_or_else(invalid)?;
            coefficient = coefficient
                .checked_mul(10)
                .and_then(|c| c.checked_add(digit as i128))
                .ok_or_else(invalid)?;
        }
        let exponent = i64::try_from(frac_part.len())
            .ok()
            .and_then(|scale| exponent.checked_sub(scale))
            .ok_or_else(invalid)?;
        if negative {
            coefficient = -coefficient;
        }
        Self::from_parts(coefficient, exponent)
    }
}

impl TryFrom<String> for Decimal128 {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Decimal128> for String {
    fn from(value: Decimal128) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.coefficient < 0 { "-" } else { "" };
        let digits = self.coefficient.unsigned_abs().to_string();
        if self.exponent >= 0 {
            return write!(f, "{}{}{}", sign, digits, "0".repeat(self.exponent as usize));
        }
        let scale = (-self.exponent) as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{}{}.{}", sign, int_part, frac_part)
        } else {
            write!(f, "{}0.{}{}", sign, "0".repeat(scale - digits.len()), digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal128 {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("1.50").to_string(), "1.5");
        assert_eq!(dec("-0.0025").to_string(), "-0.0025");
        assert_eq!(dec("12e3").to_string(), "12000");
        assert_eq!(dec("0.000").to_string(), "0");
        assert!("1.2.3".parse::<Decimal128>().is_err());
        assert!("".parse::<Decimal128>().is_err());
    }

    #[test]
    fn test_normalized_equality() {
        assert_eq!(dec("1.10"), dec("1.1"));
        assert_eq!(Decimal128::new(1500, -3).unwrap(), dec("1.5"));
        assert_ne!(dec("1.1"), dec("1.01"));
    }

    #[test]
    fn test_ordering() {
        assert!(dec("1.01") < dec("1.1"));
        assert!(dec("-2") < dec("-1.5"));
        assert!(dec("-1") < dec("0"));
        assert!(dec("1e30") > dec("1.5"));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(dec("1.5").checked_add(&dec("2.25")), Some(dec("3.75")));
        assert_eq!(dec("1").checked_sub(&dec("0.1")), Some(dec("0.9")));
        assert_eq!(dec("10").checked_div_int(4), Some(dec("2.5")));
        assert_eq!(dec("1").checked_div_int(0), None);
        let third = dec("1").checked_div_int(3).unwrap().to_string();
        assert!(third.starts_with("0.3333"));
        assert!(third.ends_with('3'));
    }

    #[test]
    fn test_float_conversion() {
        assert_eq!(Decimal128::from_f64(2.5).unwrap(), dec("2.5"));
        assert!(Decimal128::from_f64(f64::NAN).is_err());
        assert_eq!(dec("0.25").to_f64(), 0.25);
        assert_eq!(dec("-12e3").to_f64(), -12000.0);
    }

    #[test]
    fn test_exponent_range() {
        assert_eq!(dec("1e6111").exponent(), MAX_EXPONENT);
        assert_eq!(dec("1e-6176").exponent(), MIN_EXPONENT);
        assert!(dec("1e6111") > dec("1e-6176"));
        assert_eq!(dec("1e-6176").to_f64(), 0.0);

        for text in ["1e2147483647", "1e-2147483647", "10e2147483647", "1e6112", "1e-6177", "1e99999999999"] {
            let err = text.parse::<Decimal128>().unwrap_err();
            assert!(err.is_type_mismatch(), "{} gave {:?}", text, err);
        }
        assert!(Decimal128::new(1, i32::MAX).is_err());
        assert!(Decimal128::new(1, i32::MIN).is_err());
        // Trailing zeros can bring an exponent back into range
        assert_eq!(Decimal128::new(1000, MIN_EXPONENT - 3).unwrap(), dec("1e-6176"));
        assert!(Decimal128::new(10, MAX_EXPONENT).is_err());
    }

    #[test]
    fn test_extreme_exponents_do_not_overflow() {
        let big = dec("1e6111");
        let tiny = dec("1e-6176");
        assert_eq!(big.checked_add(&tiny), None);
        // Dividing the smallest step leaves the range instead of wrapping
        assert_eq!(tiny.checked_div_int(3), None);
        assert_eq!(big.checked_div_int(4), Some(dec("25e6109")));
        assert_eq!(big.to_string().len(), 6112);
        assert!(dec("-1e6111") < dec("-1e-6176"));
    }

    #[test]
    fn test_serde_goes_through_validation() {
        let json = serde_json::to_string(&dec("1.25")).unwrap();
        assert_eq!(json, "\"1.25\"");
        assert_eq!(serde_json::from_str::<Decimal128>(&json).unwrap(), dec("1.25"));
        assert!(serde_json::from_str::<Decimal128>("\"1e2147483647\"").is_err());
    }
}
