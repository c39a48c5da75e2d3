//! Type definitions for Aster futures API responses.
//!
//! Aster serves a Binance-compatible futures API; the mark price stream entry
//! is [`MarkPriceUpdate`](crate::exchange::binance::types::MarkPriceUpdate).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Futures exchange information (`/fapi/v1/exchangeInfo`).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub quote_asset: String,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

/// Historical funding sample (`/fapi/v1/fundingRate`).
///
/// Also the element type of the backend `/aster/fundingRate` route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateSample {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub funding_rate: Decimal,
    pub funding_time: i64,
}

/// Funding period derived from the two most recent samples.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateInterval {
    pub symbol: String,
    /// Milliseconds
    pub funding_interval: i64,
}
