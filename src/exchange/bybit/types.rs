//! Type definitions for Bybit v5 API responses.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::utils::decimal::{deserialize_decimal_str_opt, deserialize_millis_opt};

/// Paged result of `/v5/market/instruments-info`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentsPage<T> {
    #[serde(default)]
    pub category: String,
    pub list: Vec<T>,
    #[serde(default)]
    pub next_page_cursor: String,
}

/// Linear contract definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearInstrument {
    pub symbol: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub base_coin: String,
    #[serde(default)]
    pub quote_coin: String,
    /// Funding period in minutes
    #[serde(default)]
    pub funding_interval: Option<i64>,
}

impl LinearInstrument {
    pub fn is_tracked(&self) -> bool {
        self.contract_type == "LinearPerpetual" && self.status == "Trading" && self.quote_coin == "USDT"
    }
}

/// Spot pair definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotInstrument {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    /// `none`, `both`, `utaOnly` or `normalSpotOnly`
    #[serde(default)]
    pub margin_trading: String,
}

/// Result of `/v5/market/tickers`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerList {
    pub list: Vec<LinearTicker>,
}

/// Linear ticker, shared by the REST snapshot and the `tickers.{symbol}` topic.
///
/// Deltas only carry changed fields, so everything except the symbol is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearTicker {
    pub symbol: String,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub mark_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub index_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub funding_rate: Option<Decimal>,
    /// Open interest in coins
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub open_interest: Option<Decimal>,
    /// Open interest in USDT
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub open_interest_value: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub next_funding_time: Option<i64>,
}

impl LinearTicker {
    /// Overwrite fields present in `delta`, keep the rest.
    pub fn merge(&mut self, delta: LinearTicker) {
        self.mark_price = delta.mark_price.or(self.mark_price);
        self.index_price = delta.index_price.or(self.index_price);
        self.funding_rate = delta.funding_rate.or(self.funding_rate);
        self.open_interest = delta.open_interest.or(self.open_interest);
        self.open_interest_value = delta.open_interest_value.or(self.open_interest_value);
        self.next_funding_time = delta.next_funding_time.or(self.next_funding_time);
    }
}

/// Any frame on the public linear stream.
#[derive(Debug, Clone, Deserialize)]
pub struct WsFrame {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<LinearTicker>,
    /// Present on operation responses (`subscribe`, `ping`)
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub ret_msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_instrument() {
        let json = r#"{
            "symbol": "BTCUSDT", "contractType": "LinearPerpetual", "status": "Trading",
            "baseCoin": "BTC", "quoteCoin": "USDT", "fundingInterval": 480,
            "priceFilter": {"tickSize": "0.10"}
        }"#;
        let inst: LinearInstrument = serde_json::from_str(json).unwrap();
        assert!(inst.is_tracked());
        assert_eq!(inst.funding_interval, Some(480));

        let future = r#"{"symbol":"BTC-27DEC24","contractType":"LinearFutures","status":"Trading","quoteCoin":"USDT"}"#;
        let inst: LinearInstrument = serde_json::from_str(future).unwrap();
        assert!(!inst.is_tracked());
    }

    #[test]
    fn test_deserialize_ticker_frame() {
        let json = r#"{
            "topic": "tickers.BTCUSDT", "type": "snapshot",
            "data": {"symbol": "BTCUSDT", "markPrice": "17216.00", "indexPrice": "17227.36",
                     "fundingRate": "-0.000212", "openInterest": "68744.761",
                     "openInterestValue": "1183601235.91", "nextFundingTime": "1673280000000"},
            "cs": 24987956059, "ts": 1673272861686
        }"#;
        let frame: WsFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.kind.as_deref(), Some("snapshot"));
        let data = frame.data.unwrap();
        assert_eq!(data.funding_rate, Some(dec!(-0.000212)));
        assert_eq!(data.next_funding_time, Some(1673280000000));
    }

    #[test]
    fn test_deserialize_op_response() {
        let json = r#"{"success":true,"ret_msg":"pong","conn_id":"0970e817","op":"ping"}"#;
        let frame: WsFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.op.as_deref(), Some("ping"));
        assert!(frame.data.is_none());
    }
}
