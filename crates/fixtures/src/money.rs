//! Fixed-point currency amounts
//!
//! Transaction forms take amounts as text. Fixtures keep them as strings with
//! exactly two fractional digits; [`Amount`] is the checked numeric view used
//! when a scenario needs arithmetic (split totals).

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FixtureError, Result};

/// Non-negative currency amount held as integer cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl FromStr for Amount {
    type Err = FixtureError;

    fn from_str(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(FixtureError::amount(input, "empty"));
        }
        if s.starts_with('-') {
            return Err(FixtureError::amount(input, "negative amounts are not allowed"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (s, None),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FixtureError::amount(input, "not a number"));
        }

        let frac_cents = match frac {
            None => 0,
            Some(f) if f.is_empty() || f.len() > 2 => {
                return Err(FixtureError::amount(input, "expected one or two fractional digits"));
            }
            Some(f) if !f.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(FixtureError::amount(input, "not a number"));
            }
            Some(f) => {
                let digits: i64 = f.parse().map_err(|_| FixtureError::amount(input, "not a number"))?;
                if f.len() == 1 { digits * 10 } else { digits }
            }
        };

        let whole: i64 = whole
            .parse()
            .map_err(|_| FixtureError::amount(input, "out of range"))?;
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .map(Amount)
            .ok_or_else(|| FixtureError::amount(input, "out of range"))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Format a numeric amount with exactly two fractional digits
pub fn format_currency(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Parse a formatted amount back into a number
pub fn parse_currency(s: &str) -> Result<f64> {
    s.parse::<Amount>().map(Amount::as_f64)
}
