//! Decimal parsing for values coming from exchange and market-data payloads.
//!
//! Upstream APIs send amounts as strings, as JSON floats, and sometimes in
//! scientific notation. Everything is converted to [`Decimal`] as early as
//! possible so balances are summed without binary floating point drift.

use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::Value;

/// Parse a decimal string, accepting scientific notation (`1.5e-7`).
pub fn parse_decimal(value: &str) -> Result<Decimal> {
    let value = value.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .with_context(|| format!("Invalid decimal value: {value}"))
}

/// Decimal from a JSON number or numeric string. `null`, empty strings and
/// values outside the decimal range yield `None`.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()).ok(),
        Value::String(s) if !s.trim().is_empty() => parse_decimal(s).ok(),
        _ => None,
    }
}

/// Scale an integer amount of base units (wei, lamports) down by `decimals`.
pub fn from_base_units(raw: &str, decimals: u32) -> Result<Decimal> {
    let raw = raw.trim();
    let amount: i128 = raw
        .parse()
        .with_context(|| format!("Invalid integer amount: {raw}"))?;
    Decimal::try_from_i128_with_scale(amount, decimals)
        .with_context(|| format!("Amount {raw} with {decimals} decimals is out of range"))
}
