//! Type definitions for Bitget v2 API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::decimal::{deserialize_decimal_str_opt, deserialize_millis_opt};

/// Product line of USDT-margined perpetuals.
pub const PRODUCT_TYPE: &str = "USDT-FUTURES";

/// Current funding record (`/api/v2/mix/market/current-fund-rate`).
///
/// Also the value type served by the backend `/current-fund-rate` route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFundRate {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub funding_rate: Decimal,
    /// Settlement period in hours
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub funding_rate_interval: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_funding_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_funding_rate: Option<String>,
}

/// Futures ticker, shared by the REST tickers endpoint and the `ticker` channel.
///
/// Every field but the symbol is optional so a partial push can be merged
/// into the stored record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    #[serde(alias = "instId")]
    pub symbol: String,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub last_pr: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub mark_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub index_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub funding_rate: Option<Decimal>,
    /// Open interest in coins
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub holding_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub next_funding_time: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub ts: Option<i64>,
}

impl Ticker {
    /// A contract with no last trade price is not live yet.
    pub fn is_trading(&self) -> bool {
        self.last_pr.map(|p| !p.is_zero()).unwrap_or(false)
    }

    /// Overwrite fields present in `update`, keep the rest.
    pub fn merge(&mut self, update: Ticker) {
        self.last_pr = update.last_pr.or(self.last_pr);
        self.mark_price = update.mark_price.or(self.mark_price);
        self.index_price = update.index_price.or(self.index_price);
        self.funding_rate = update.funding_rate.or(self.funding_rate);
        self.holding_amount = update.holding_amount.or(self.holding_amount);
        self.next_funding_time = update.next_funding_time.or(self.next_funding_time);
        self.ts = update.ts.or(self.ts);
    }
}

/// Spot trading pair (`/api/v2/spot/public/symbols`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotSymbol {
    pub symbol: String,
    #[serde(default)]
    pub base_coin: String,
    #[serde(default)]
    pub quote_coin: String,
    #[serde(default)]
    pub status: String,
}

/// Margin-enabled pair (`/api/v2/margin/currencies`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCurrency {
    pub symbol: String,
    #[serde(default)]
    pub base_coin: String,
    #[serde(default)]
    pub quote_coin: String,
}

/// Channel argument of a subscription or push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsArg {
    pub inst_type: String,
    pub channel: String,
    pub inst_id: String,
}

impl WsArg {
    pub fn ticker(symbol: &str) -> Self {
        Self {
            inst_type: PRODUCT_TYPE.to_string(),
            channel: "ticker".to_string(),
            inst_id: symbol.to_string(),
        }
    }
}

/// Any frame on the public stream: an event (`subscribe`, `error`) or a push.
#[derive(Debug, Clone, Deserialize)]
pub struct WsFrame {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub arg: Option<WsArg>,
    #[serde(default)]
    pub data: Vec<Ticker>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_fund_rate() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "fundingRate": "0.000068",
            "fundingRateInterval": "8",
            "nextUpdate": "1743062400000",
            "minFundingRate": "-0.003",
            "maxFundingRate": "0.003"
        }"#;
        let rate: CurrentFundRate = serde_json::from_str(json).unwrap();
        assert_eq!(rate.funding_rate, dec!(0.000068));
        assert_eq!(rate.funding_rate_interval, Some(dec!(8)));

        let back = serde_json::to_value(&rate).unwrap();
        assert_eq!(back["fundingRateInterval"], "8");
        assert_eq!(back["fundingRate"], "0.000068");
    }

    #[test]
    fn test_ticker_push_uses_inst_id() {
        let json = r#"{
            "instId": "BTCUSDT", "lastPr": "27000.5", "markPrice": "27000.0",
            "indexPrice": "27001.2", "fundingRate": "0.000010",
            "holdingAmount": "7500.25", "nextFundingTime": "1695484800000", "ts": "1695457200000"
        }"#;
        let ticker: Ticker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.symbol, "BTCUSDT");
        assert_eq!(ticker.holding_amount, Some(dec!(7500.25)));
        assert_eq!(ticker.next_funding_time, Some(1695484800000));
        assert!(ticker.is_trading());
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut ticker = Ticker {
            symbol: "BTCUSDT".to_string(),
            mark_price: Some(dec!(1)),
            funding_rate: Some(dec!(0.0001)),
            ..Ticker::default()
        };
        ticker.merge(Ticker {
            symbol: "BTCUSDT".to_string(),
            mark_price: Some(dec!(2)),
            ..Ticker::default()
        });
        assert_eq!(ticker.mark_price, Some(dec!(2)));
        assert_eq!(ticker.funding_rate, Some(dec!(0.0001)));
    }

    #[test]
    fn test_zero_last_price_is_not_trading() {
        let ticker: Ticker = serde_json::from_str(r#"{"symbol":"NEWUSDT","lastPr":"0"}"#).unwrap();
        assert!(!ticker.is_trading());
    }
}
