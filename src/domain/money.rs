use std::fmt;

use serde::{Deserialize, Serialize};

/// Money is stored as integer cents. $50.00 = 5000 cents.
pub type Cents = i64;

/// Percentage of subscription revenue retained by the platform.
pub const PLATFORM_FEE_PERCENT: Cents = 15;

/// Highest price a subscription tier may carry ($100,000.00).
pub const MAX_TIER_PRICE_CENTS: Cents = 10_000_000;

/// Largest single deposit accepted ($1,000,000.00).
pub const MAX_DEPOSIT_CENTS: Cents = 100_000_000;

/// Format cents as a decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a decimal amount into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two decimal places is an error, not a truncation.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim().trim_start_matches('$');
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, decimal_str) = digits.split_once('.').unwrap_or((digits, ""));
    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if decimal_str.len() > 2 {
        return Err(ParseCentsError::TooManyDecimals);
    }

    let units: Cents = if units_str.is_empty() {
        0
    } else {
        parse_digits(units_str)?
    };
    let decimals: Cents = match decimal_str.len() {
        0 => 0,
        1 => parse_digits(decimal_str)? * 10,
        _ => parse_digits(decimal_str)?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimals))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

fn parse_digits(s: &str) -> Result<Cents, ParseCentsError> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat);
    }
    s.parse().map_err(|_| ParseCentsError::Overflow)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooManyDecimals => write!(f, "at most two decimal places allowed"),
            ParseCentsError::Overflow => write!(f, "amount too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

/// A gross amount split into the platform fee and the creator's share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Cents,
    pub fee: Cents,
    pub net: Cents,
}

/// Split a gross amount into platform fee and net creator proceeds.
/// The fee is rounded half-up to the nearest cent; net always absorbs the remainder
/// so that `fee + net == gross`.
pub fn platform_fee(gross: Cents) -> FeeSplit {
    // Widened so the multiply cannot overflow; |fee| <= |gross| fits back in i64.
    let fee = ((gross as i128 * PLATFORM_FEE_PERCENT as i128 + 50) / 100) as Cents;
    FeeSplit {
        gross,
        fee,
        net: gross - fee,
    }
}
