use thiserror::Error;

/// Amounts are integer cents: 1 unit = 100 cents, so 30.00 = 3000.
pub type Cents = i64;

/// Largest amount a single expense or debt may carry (10 trillion units).
pub const MAX_AMOUNT_CENTS: Cents = 1_000_000_000_000_000;

/// Render cents as a decimal string, e.g. 3000 -> "30.00", -5 -> "-0.05".
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Render cents followed by a currency code, e.g. "30.00 EUR".
pub fn format_amount(cents: Cents, currency: &str) -> String {
    format!("{} {}", format_cents(cents), currency)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("empty amount")]
    Empty,
    #[error("invalid money format: {0}")]
    InvalidFormat(String),
    #[error("amount has more than two decimal places: {0}")]
    TooPrecise(String),
}

/// Parse a decimal string into cents.
///
/// Accepts "30", "30.5", "30.50", ".5" and a leading minus sign. Unlike a
/// bank statement parser this refuses a third decimal place instead of
/// truncating it, since a split must add up to the exact total.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseCentsError::Empty);
    }

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let invalid = || ParseCentsError::InvalidFormat(input.to_string());

    let (units_str, decimals_str) = match digits.split_once('.') {
        Some((units, decimals)) => (units, decimals),
        None => (digits, ""),
    };

    if units_str.is_empty() && decimals_str.is_empty() {
        return Err(invalid());
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !decimals_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if decimals_str.len() > 2 {
        return Err(ParseCentsError::TooPrecise(input.to_string()));
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| invalid())?
    };
    let decimals: i64 = match decimals_str.len() {
        0 => 0,
        1 => decimals_str.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => decimals_str.parse().map_err(|_| invalid())?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimals))
        .ok_or_else(invalid)?;

    Ok(if negative { -cents } else { cents })
}
