use crate::{CoreError, CoreResult};

const ZERO_DECIMAL: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

const THREE_DECIMAL: &[&str] = &["BHD", "JOD", "KWD", "OMR", "TND"];

/// Number of fractional digits the payment provider expects for a currency
pub fn currency_exponent(currency: &str) -> u32 {
    let code = currency.to_ascii_uppercase();
    if ZERO_DECIMAL.contains(&code.as_str()) {
        0
    } else if THREE_DECIMAL.contains(&code.as_str()) {
        3
    } else {
        2
    }
}

/// Validate a stored amount and convert it to the provider's minor units.
///
/// Never substitutes a default: a non-finite, non-positive or unparseable
/// price is an error for the caller to surface.
pub fn to_minor_units(amount: f64, currency: &str) -> CoreResult<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CoreError::ValidationError(format!(
            "amount must be positive and finite, got {}",
            amount
        )));
    }
    validate_currency(currency)?;

    let scale = 10f64.powi(currency_exponent(currency) as i32);
    let minor = (amount * scale).round();
    if minor < 1.0 || minor > i64::MAX as f64 {
        return Err(CoreError::ValidationError(format!(
            "amount {} {} is out of range",
            amount, currency
        )));
    }
    Ok(minor as i64)
}

pub fn validate_currency(currency: &str) -> CoreResult<()> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!("invalid currency code '{}'", currency)))
    }
}

/// Parse a provider decimal string such as "431.20"
pub fn parse_amount(raw: &str) -> CoreResult<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::ValidationError(format!("invalid amount '{}'", raw)))?;
    if !value.is_finite() {
        return Err(CoreError::ValidationError(format!("invalid amount '{}'", raw)));
    }
    Ok(value)
}
