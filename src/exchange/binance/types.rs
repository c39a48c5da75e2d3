//! Type definitions for Binance API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::decimal::{deserialize_decimal_str, deserialize_decimal_str_opt};

/// Spot exchange information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotExchangeInfo {
    pub symbols: Vec<SpotSymbolInfo>,
}

/// Symbol information for spot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotSymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub base_asset: String,
    #[serde(default)]
    pub quote_asset: String,
    /// Newer responses group permissions into sets; the first set applies.
    #[serde(default)]
    pub permission_sets: Vec<Vec<String>>,
    /// Older responses list permissions flat.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl SpotSymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        match self.permission_sets.first() {
            Some(set) => set.iter().any(|p| p == permission),
            None => self.permissions.iter().any(|p| p == permission),
        }
    }
}

/// Funding period override from `/fapi/v1/fundingInfo`.
///
/// Only symbols whose period or caps were adjusted are listed; everything
/// else settles every 8 hours.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingInfo {
    pub symbol: String,
    pub funding_interval_hours: u32,
}

/// Mark price stream entry (`!markPrice@arr`). Aster serves the same shape.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkPriceUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "p", deserialize_with = "deserialize_decimal_str")]
    pub mark_price: Decimal,
    #[serde(rename = "i", default, deserialize_with = "deserialize_decimal_str_opt")]
    pub index_price: Option<Decimal>,
    /// Empty for contracts without funding
    #[serde(rename = "r", default, deserialize_with = "deserialize_decimal_str_opt")]
    pub funding_rate: Option<Decimal>,
    #[serde(rename = "T", default)]
    pub next_funding_time: i64,
}

/// Futures symbol price ticker (`/fapi/v2/ticker/price`).
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
}

/// Open interest for a single symbol (`/fapi/v1/openInterest`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterest {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub open_interest: Decimal,
    #[serde(default)]
    pub time: i64,
}

/// Error frame returned for a rejected stream request.
#[derive(Debug, Clone, Deserialize)]
pub struct WsRequestError {
    pub code: i64,
    pub msg: String,
}
