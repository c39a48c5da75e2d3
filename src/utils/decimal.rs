//! Decimal helpers for exchange numeric strings.
//!
//! Exchanges publish prices and rates as JSON strings. Wire types parse them
//! into [`Decimal`] at the boundary; conversion to `f64` happens only when a
//! normalized row is built.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Convert a decimal to `f64`, `None` if it does not fit.
pub fn to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().filter(|v| v.is_finite())
}

/// Parse a raw numeric string such as `"0.00010000"`.
pub fn parse_str(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Deserialize a required string-encoded decimal.
pub fn deserialize_decimal_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_str(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid decimal {:?}", s)))
}

/// Deserializer that handles null, missing, empty and malformed string decimals.
///
/// Exchanges send `""` for fields that are not populated yet (for instance a
/// funding rate on a freshly listed contract), so an unparsable value becomes
/// `None` instead of failing the whole record.
pub fn deserialize_decimal_str_opt<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Option<StrOrNum>> = Option::deserialize(deserializer)?;
    Ok(match opt {
        Some(Some(StrOrNum::Str(s))) => parse_str(&s),
        Some(Some(StrOrNum::Num(n))) => Decimal::from_f64_retain(n),
        _ => None,
    })
}

/// Deserialize a millisecond timestamp sent either as a number or a string.
pub fn deserialize_millis_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Option<StrOrNum>> = Option::deserialize(deserializer)?;
    Ok(match opt {
        Some(Some(StrOrNum::Str(s))) => s.trim().parse::<i64>().ok(),
        Some(Some(StrOrNum::Num(n))) if n.is_finite() => Some(n as i64),
        _ => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(f64),
}
