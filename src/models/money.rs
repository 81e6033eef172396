//! Fixed-point money and rate types for payroll computation
//!
//! `Money` stores amounts in cents (i64) to avoid floating-point precision
//! issues: every value is by construction quantized to 2 fractional digits,
//! and addition/subtraction are exact. `Rate` is a 4-fractional-digit scalar
//! used for hours and multipliers. Multiplying money by a rate rounds half-up
//! (away from zero) to the cent at that point, so each pipeline step
//! re-quantizes before its result feeds any further arithmetic and sub-cent
//! drift cannot compound across line items.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Scale factor for `Rate`: 4 fractional digits
const RATE_SCALE: i64 = 10_000;

/// Represents a monetary amount stored as cents (hundredths of the currency unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create a Money amount from cents
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Create a Money amount from major and minor units
    ///
    /// # Examples
    /// ```
    /// use payguard::models::Money;
    /// let amount = Money::from_major_minor(10, 50); // 10.50
    /// ```
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        Self(major * 100 + minor)
    }

    /// Create a zero Money amount
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the amount in cents
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Get the whole-unit portion (truncated toward zero)
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Get the cents portion (0-99)
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Check if the amount is zero
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Check if the amount is negative
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Get the absolute value
    pub const fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Multiply by a rate, rounding half-up (away from zero) to the cent
    ///
    /// This is the single quantization point for rate-based computation such
    /// as `hourly_rate × overtime_hours`: the result is an exact number of
    /// cents and participates in further arithmetic without residue.
    pub fn mul_rate(&self, rate: Rate) -> Self {
        Self(div_round_half_up(
            self.0 as i128 * rate.0 as i128,
            RATE_SCALE as i128,
        ))
    }

    /// Parse a money amount from a string
    ///
    /// Accepts formats: "10.50", "-10.50", "10", "10.5"
    pub fn parse(s: &str) -> Result<Self, MoneyParseError> {
        let (sign, cents) = parse_fixed_point(s, 2)?;
        Ok(Self(sign * cents))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "-{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor_part())
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A dimensionless fixed-point scalar with 4 fractional digits
///
/// Used for overtime hours, absence days, and pay multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(i64);

impl Rate {
    /// Create a rate from an already-scaled value (4 fractional digits)
    pub const fn from_scaled(scaled: i64) -> Self {
        Self(scaled)
    }

    /// Create a rate from a whole number
    pub const fn from_int(value: i64) -> Self {
        Self(value * RATE_SCALE)
    }

    /// A zero rate
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the raw scaled value
    pub const fn scaled(&self) -> i64 {
        self.0
    }

    /// Check if the rate is zero
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiply two rates, rounding half-up at 4 fractional digits
    pub fn mul(&self, other: Rate) -> Self {
        Self(div_round_half_up(
            self.0 as i128 * other.0 as i128,
            RATE_SCALE as i128,
        ))
    }

    /// Parse a rate from a string, e.g. "1.5", "10", "0.25"
    pub fn parse(s: &str) -> Result<Self, MoneyParseError> {
        let (sign, scaled) = parse_fixed_point(s, 4)?;
        Ok(Self(sign * scaled))
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = (self.0 / RATE_SCALE).abs();
        let frac = (self.0 % RATE_SCALE).abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let s = format!("{:04}", frac);
            write!(f, "{}{}.{}", sign, whole, s.trim_end_matches('0'))
        }
    }
}

/// Divide, rounding half-up away from zero. `den` must be positive.
fn div_round_half_up(num: i128, den: i128) -> i64 {
    let sign: i128 = if num < 0 { -1 } else { 1 };
    let q = (num.abs() * 2 + den) / (den * 2);
    (sign * q) as i64
}

/// Parse a decimal string into (sign, value scaled to `digits` fractional digits)
fn parse_fixed_point(s: &str, digits: u32) -> Result<(i64, i64), MoneyParseError> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(stripped) => (true, stripped),
        None => (false, s),
    };

    if s.is_empty() {
        return Err(MoneyParseError::InvalidFormat(s.to_string()));
    }

    let scale = 10i64.pow(digits);
    let scaled = match s.split_once('.') {
        Some((whole, frac)) => {
            // The fraction must be bare digits; i64::parse would accept a
            // sign here and silently produce a surprising value
            if frac.len() > digits as usize
                || frac.is_empty()
                || !frac.chars().all(|c| c.is_ascii_digit())
            {
                return Err(MoneyParseError::InvalidFormat(s.to_string()));
            }
            let whole: i64 = whole
                .parse()
                .map_err(|_| MoneyParseError::InvalidFormat(s.to_string()))?;
            let frac_value: i64 = frac
                .parse()
                .map_err(|_| MoneyParseError::InvalidFormat(s.to_string()))?;
            whole * scale + frac_value * 10i64.pow(digits - frac.len() as u32)
        }
        None => {
            s.parse::<i64>()
                .map_err(|_| MoneyParseError::InvalidFormat(s.to_string()))?
                * scale
        }
    };

    Ok((if negative { -1 } else { 1 }, scaled))
}

/// Error type for money/rate parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    InvalidFormat(String),
}

impl fmt::Display for MoneyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneyParseError::InvalidFormat(s) => write!(f, "Invalid decimal format: {}", s),
        }
    }
}

impl std::error::Error for MoneyParseError {}
