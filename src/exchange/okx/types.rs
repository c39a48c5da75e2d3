//! Type definitions for OKX v5 API responses.
//!
//! REST endpoints and stream channels share record shapes, so each struct
//! below decodes both.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::decimal::{deserialize_decimal_str_opt, deserialize_millis_opt};

/// Instrument definition (`/api/v5/public/instruments`, `instruments` channel).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub inst_id: String,
    #[serde(default)]
    pub inst_type: String,
    /// `live`, `suspend`, `preopen` or `test`
    #[serde(default)]
    pub state: String,
}

impl Instrument {
    pub fn is_live(&self) -> bool {
        self.state == "live"
    }
}

/// `funding-rate` channel record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRate {
    pub inst_id: String,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub funding_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub funding_time: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub next_funding_time: Option<i64>,
}

impl FundingRate {
    /// Settlement period implied by the two announced funding times.
    pub fn interval_millis(&self) -> Option<i64> {
        match (self.funding_time, self.next_funding_time) {
            (Some(current), Some(next)) => Some(next - current),
            _ => None,
        }
    }
}

/// Mark price (`/api/v5/public/mark-price`, `mark-price` channel).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPrice {
    pub inst_id: String,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub mark_px: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub ts: Option<i64>,
}

/// Index price (`/api/v5/market/index-tickers`, `index-tickers` channel).
/// Keyed by the index id, e.g. `BTC-USDT`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexTicker {
    pub inst_id: String,
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub idx_px: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_millis_opt")]
    pub ts: Option<i64>,
}

/// Open interest (`/api/v5/public/open-interest`, `open-interest` channel).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterest {
    pub inst_id: String,
    /// Contracts
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub oi: Option<Decimal>,
    /// Coins
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub oi_ccy: Option<Decimal>,
}

/// Channel argument of a subscription or push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsArg {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
}

impl WsArg {
    pub fn inst_type(channel: &str, inst_type: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_type: Some(inst_type.to_string()),
            inst_id: None,
        }
    }

    pub fn inst_id(channel: &str, inst_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_type: None,
            inst_id: Some(inst_id.to_string()),
        }
    }
}

/// Any frame on the public stream: an event (`subscribe`, `error`) or a push.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsFrame {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub arg: Option<WsArg>,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
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
    fn test_funding_interval() {
        let json = r#"{
            "instId": "BTC-USDT-SWAP", "instType": "SWAP", "fundingRate": "0.0001",
            "fundingTime": "1703088000000", "nextFundingTime": "1703116800000",
            "method": "current_period"
        }"#;
        let fr: FundingRate = serde_json::from_str(json).unwrap();
        assert_eq!(fr.funding_rate, Some(dec!(0.0001)));
        assert_eq!(fr.interval_millis(), Some(8 * 60 * 60 * 1000));
    }

    #[test]
    fn test_subscription_args_serialize_compactly() {
        let arg = serde_json::to_value(WsArg::inst_id("mark-price", "BTC-USDT-SWAP")).unwrap();
        assert_eq!(arg, serde_json::json!({"channel": "mark-price", "instId": "BTC-USDT-SWAP"}));
        let arg = serde_json::to_value(WsArg::inst_type("instruments", "SWAP")).unwrap();
        assert_eq!(arg, serde_json::json!({"channel": "instruments", "instType": "SWAP"}));
    }

    #[test]
    fn test_open_interest() {
        let json = r#"{"instId":"BTC-USDT-SWAP","instType":"SWAP","oi":"2216113.01","oiCcy":"22161.1301","oiUsd":"1.4e9","ts":"1"}"#;
        let oi: OpenInterest = serde_json::from_str(json).unwrap();
        assert_eq!(oi.oi_ccy, Some(dec!(22161.1301)));
    }
}
