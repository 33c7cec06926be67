//! Decimal scaling and display helpers for raw ledger integers.

use crate::error::DscError;
use crate::types::{lowercase_address, Amount, HealthFactor, DEBT_TOKEN_DECIMALS};
use alloy_primitives::{Address, U256};

pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u8).pow(U256::from(decimals))
}

/// Scale a user-entered decimal string by `decimals`.
///
/// Rejects signs, exponents, empty input and fractions finer than the token supports.
pub fn parse_units(input: &str, decimals: u8) -> Result<Amount, DscError> {
    let trimmed = input.trim();
    let invalid = |reason: &str| DscError::InputValidation(format!("amount '{trimmed}': {reason}"));

    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("not a non-negative decimal number"));
    }
    if fraction.len() > decimals as usize {
        return Err(invalid(&format!("more than {decimals} fractional digits")));
    }

    let overflow = || invalid("too large");
    let whole_value = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| overflow())?
    };

    let padded = format!("{fraction:0<width$}", width = decimals as usize);
    let fraction_value = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10).map_err(|_| overflow())?
    };

    whole_value
        .checked_mul(pow10(decimals))
        .and_then(|scaled| scaled.checked_add(fraction_value))
        .ok_or_else(overflow)
}

/// Render a raw amount as a decimal string, e.g. `1.5` or `2.0`.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let unit = pow10(decimals);
    let whole = amount / unit;
    let fraction = amount % unit;

    let digits = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}

/// Round an 18-decimal value to hundredths, returning (whole, cents).
fn to_hundredths(raw: U256) -> (U256, u64) {
    let step = pow10(DEBT_TOKEN_DECIMALS - 2);
    let half = step / U256::from(2u8);
    let hundredths = raw.saturating_add(half) / step;
    let whole = hundredths / U256::from(100u8);
    let cents = (hundredths % U256::from(100u8)).to::<u64>();
    (whole, cents)
}

pub fn format_health_factor(health_factor: &HealthFactor) -> String {
    match health_factor {
        HealthFactor::Infinite => "∞".to_string(),
        HealthFactor::Ratio(raw) => {
            let (whole, cents) = to_hundredths(*raw);
            format!("{whole}.{cents:02}")
        }
    }
}

/// Render an 18-decimal quote amount as dollars with thousands separators.
pub fn format_usd(raw: Amount) -> String {
    let (whole, cents) = to_hundredths(raw);
    let digits = whole.to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("${grouped}.{cents:02}")
}

pub fn short_address(address: &Address) -> String {
    let full = lowercase_address(address);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
