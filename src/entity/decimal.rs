//! Arbitrary-precision decimal
//!
//! Invariant:
//! - value == mantissa * 10^-scale
//! - mantissa carries the sign
//!
//! The scale is kept as written, so `1.50` and `1.5` are distinct values.
//! This is what lets the string encoding round-trip exactly.

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, Sign};

/// Largest scale or exponent shift accepted when parsing
pub const MAX_PARSE_SCALE: i64 = 1000;

/// Decimal with an unbounded mantissa and an explicit scale
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: BigInt,
    scale: u32,
}

impl Decimal {
    /// Construct a decimal from mantissa and scale.
    pub fn new(mantissa: BigInt, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.sign() == Sign::NoSign
    }

    /// Significant digits of the mantissa; zero counts as one digit
    pub fn digits(&self) -> u32 {
        self.mantissa.magnitude().to_string().len() as u32
    }

    /// Digits left of the decimal point
    pub fn integer_digits(&self) -> u32 {
        self.digits().saturating_sub(self.scale)
    }

    /// Rescale to exactly `scale` fractional digits, rounding half away from zero.
    #[must_use]
    pub fn round_to_scale(&self, scale: u32) -> Self {
        if scale >= self.scale {
            let factor = pow10(scale - self.scale);
            return Self::new(&self.mantissa * factor, scale);
        }

        let divisor = pow10(self.scale - scale);
        // BigInt division truncates toward zero and the remainder keeps the dividend's sign
        let mut quotient = &self.mantissa / &divisor;
        let remainder = &self.mantissa % &divisor;
        if remainder.magnitude() * 2u32 >= *divisor.magnitude() {
            match self.mantissa.sign() {
                Sign::Minus => quotient -= 1,
                _ => quotient += 1,
            }
        }
        Self::new(quotient, scale)
    }
}

fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u32).pow(exp)
}

/// Error returned when text is not a decimal literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDecimalError(String);

impl fmt::Display for ParseDecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal '{}'", self.0)
    }
}

impl std::error::Error for ParseDecimalError {}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    /// Accepts `[-+]digits[.digits][e[-+]digits]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let text = s.trim();

        let (number, exponent) = match text.find(['e', 'E']) {
            Some(pos) => {
                let exp: i64 = text[pos + 1..].parse().map_err(|_| err())?;
                (&text[..pos], exp)
            }
            None => (text, 0),
        };

        let (negative, unsigned) = match number.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, number.strip_prefix('+').unwrap_or(number)),
        };

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mut mantissa: BigInt = digits.parse().map_err(|_| err())?;
        if negative {
            mantissa = -mantissa;
        }

        let scale = (frac_part.len() as i64).saturating_sub(exponent);
        if scale.unsigned_abs() > MAX_PARSE_SCALE as u64 {
            return Err(err());
        }
        if scale < 0 {
            let factor = pow10(u32::try_from(-scale).map_err(|_| err())?);
            Ok(Self::new(mantissa * factor, 0))
        } else {
            Ok(Self::new(mantissa, u32::try_from(scale).map_err(|_| err())?))
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut digits = self.mantissa.magnitude().to_string();
        let scale = self.scale as usize;
        if self.mantissa.sign() == Sign::Minus {
            write!(f, "-")?;
        }
        if scale == 0 {
            return write!(f, "{}", digits);
        }
        if digits.len() <= scale {
            digits = format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits);
        }
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        write!(f, "{}.{}", int_part, frac_part)
    }
}

impl From<BigInt> for Decimal {
    fn from(value: BigInt) -> Self {
        Self::new(value, 0)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::new(BigInt::from(value), 0)
    }
}
