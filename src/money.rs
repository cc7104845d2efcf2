//! Exact-decimal money handling
//!
//! Amounts cross the API boundary as text and are parsed here into
//! [`Decimal`]. Binary floating point never touches a balance.
//!
//! Accepted format is deliberately narrow:
//! - `0.5`, not `.5`
//! - `5` or `5.0`, not `5.`
//! - no `+` prefix, no scientific notation, no surrounding whitespace
//! - at most [`MONEY_SCALE`] fractional digits
//! - at most [`MAX_INTEGER_DIGITS`] integer digits (fits `NUMERIC(20,8)`)

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits stored for every balance and amount.
pub const MONEY_SCALE: u32 = 8;

/// Integer digits allowed by the `NUMERIC(20,8)` columns.
pub const MAX_INTEGER_DIGITS: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount cannot be empty")]
    Empty,

    #[error("invalid format: use 0.5 not .5")]
    LeadingDot,

    #[error("invalid format: use 5.0 not 5.")]
    TrailingDot,

    #[error("invalid format: scientific notation not allowed")]
    Scientific,

    #[error("invalid format: + prefix not allowed")]
    PlusPrefix,

    #[error("invalid format: surrounding whitespace not allowed")]
    Whitespace,

    #[error("invalid decimal: {0}")]
    Malformed(String),

    #[error("amount cannot be negative")]
    Negative,

    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("at most {MONEY_SCALE} fractional digits allowed")]
    PrecisionOverflow,

    #[error("at most {MAX_INTEGER_DIGITS} integer digits allowed")]
    TooLarge,
}

/// Largest value a balance column can hold.
pub fn max_balance() -> Decimal {
    // 999_999_999_999.99999999
    Decimal::from_i128_with_scale(99_999_999_999_999_999_999, MONEY_SCALE)
}

/// Parse a strictly formatted, non-negative decimal.
pub fn parse_decimal(text: &str) -> Result<Decimal, MoneyError> {
    if text.is_empty() {
        return Err(MoneyError::Empty);
    }
    if text.trim() != text {
        return Err(MoneyError::Whitespace);
    }
    if text.starts_with('+') {
        return Err(MoneyError::PlusPrefix);
    }
    if text.contains('e') || text.contains('E') {
        return Err(MoneyError::Scientific);
    }
    if text.starts_with('.') {
        return Err(MoneyError::LeadingDot);
    }
    if text.ends_with('.') {
        return Err(MoneyError::TrailingDot);
    }
    if !text
        .bytes()
        .all(|b| b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return Err(MoneyError::Malformed(text.to_string()));
    }

    // Also catches "-0" and "-0.00".
    if text.starts_with('-') {
        return Err(MoneyError::Negative);
    }

    let value = Decimal::from_str(text).map_err(|e| MoneyError::Malformed(e.to_string()))?;

    let (integer_part, fraction_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if fraction_part.len() > MONEY_SCALE as usize {
        return Err(MoneyError::PrecisionOverflow);
    }
    if integer_part.trim_start_matches('0').len() > MAX_INTEGER_DIGITS {
        return Err(MoneyError::TooLarge);
    }

    Ok(to_ledger_scale(value))
}

/// Parse a transfer amount: strictly positive.
pub fn parse_amount(text: &str) -> Result<Decimal, MoneyError> {
    let value = parse_decimal(text)?;
    if value <= Decimal::ZERO {
        return Err(MoneyError::NotPositive);
    }
    Ok(value)
}

/// Parse an opening balance: zero is allowed.
pub fn parse_balance(text: &str) -> Result<Decimal, MoneyError> {
    parse_decimal(text)
}

/// Normalise to the ledger's fixed scale so every backend renders alike.
pub fn to_ledger_scale(mut value: Decimal) -> Decimal {
    value.rescale(MONEY_SCALE);
    value
}
