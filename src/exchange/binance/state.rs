//! Binance per-symbol state and stream reconciliation.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use super::types::{FundingInfo, MarkPriceUpdate, SpotSymbolInfo, WsRequestError};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::shared::StreamState;
use crate::exchange::{NormalizedQuote, Venue};
use crate::utils::decimal::to_f64;
use crate::utils::normalize::{
    annualize_apr, is_quote_symbol, quote_symbol, resolve_interval_hours, strip_quote,
    FundingInterval, DEFAULT_FUNDING_INTERVAL_HOURS,
};

const VENUE: Venue = Venue::Binance;

/// Listing metadata and backend data fetched by REST.
#[derive(Debug, Clone, Default)]
pub struct BinanceMetadata {
    pub spot: Vec<SpotSymbolInfo>,
    pub funding_info: Vec<FundingInfo>,
    /// `None` when the backend could not be reached; previous values are kept.
    pub open_interest: Option<HashMap<String, f64>>,
}

#[derive(Debug, Default)]
pub struct BinanceState {
    spot: HashMap<String, SpotSymbolInfo>,
    funding_hours: HashMap<String, u32>,
    /// Open interest in coins, from the backend cache
    open_interest: HashMap<String, f64>,
    marks: BTreeMap<String, MarkPriceUpdate>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Frame {
    Marks(Vec<serde_json::Value>),
    Response {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        error: Option<WsRequestError>,
    },
}

impl BinanceState {
    pub fn apply_metadata(&mut self, meta: BinanceMetadata) {
        self.spot = meta
            .spot
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();
        self.funding_hours = meta
            .funding_info
            .into_iter()
            .map(|f| (f.symbol, f.funding_interval_hours))
            .collect();
        if let Some(oi) = meta.open_interest {
            self.open_interest = oi;
        }
    }

    /// Upsert one mark price record. Each entry is a full snapshot of its symbol.
    pub fn apply_mark(&mut self, update: MarkPriceUpdate) -> Option<String> {
        if !is_quote_symbol(&update.symbol) {
            return None;
        }
        let symbol = update.symbol.clone();
        self.marks.insert(symbol.clone(), update);
        Some(symbol)
    }

    pub fn table_data(&self) -> Vec<NormalizedQuote> {
        self.marks
            .values()
            .filter_map(|m| match self.row(m) {
                Ok(row) => Some(row),
                Err(e) => {
                    trace!(error = %e, "Skipping row");
                    None
                }
            })
            .collect()
    }

    fn row(&self, mark: &MarkPriceUpdate) -> ExchangeResult<NormalizedQuote> {
        let gap = |field| ExchangeError::data_gap(VENUE, &mark.symbol, field);
        let rate = mark.funding_rate.and_then(to_f64).ok_or_else(|| gap("funding rate"))?;
        let mark_price = to_f64(mark.mark_price).ok_or_else(|| gap("mark price"))?;
        let index_price = mark.index_price.and_then(to_f64).ok_or_else(|| gap("index price"))?;

        let interval = self
            .funding_hours
            .get(&mark.symbol)
            .map(|h| FundingInterval::Hours(*h as f64));
        let hours = resolve_interval_hours(interval, DEFAULT_FUNDING_INTERVAL_HOURS);

        let open_interest_usd = self
            .open_interest
            .get(&mark.symbol)
            .map(|qty| qty * mark_price)
            .unwrap_or(0.0);

        Ok(NormalizedQuote {
            exchange: VENUE,
            symbol: strip_quote(&mark.symbol).to_string(),
            funding_rate_apr: annualize_apr(rate, hours),
            mark_price,
            index_price,
            open_interest_usd,
        })
    }

    fn spot_has(&self, base: &str, permission: &str) -> bool {
        self.spot
            .get(&quote_symbol(base))
            .map(|s| s.is_trading() && s.has_permission(permission))
            .unwrap_or(false)
    }

    pub fn is_spot_available(&self, base: &str) -> bool {
        self.spot_has(base, "SPOT")
    }

    pub fn is_margin_available(&self, base: &str) -> bool {
        self.spot_has(base, "MARGIN")
    }
}

impl StreamState for BinanceState {
    fn apply_message(&mut self, text: &str) -> ExchangeResult<Vec<String>> {
        let frame: Frame = serde_json::from_str(text).map_err(|e| ExchangeError::Decode {
            venue: VENUE,
            url: "stream".to_string(),
            source: e,
        })?;

        match frame {
            Frame::Response { id, error: Some(err) } => Err(ExchangeError::Subscription {
                venue: VENUE,
                code: err.code.to_string(),
                msg: format!("request {:?}: {}", id, err.msg),
            }),
            Frame::Response { id, .. } => {
                debug!(?id, "Subscription acknowledged");
                Ok(Vec::new())
            }
            Frame::Marks(items) => Ok(items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<MarkPriceUpdate>(item) {
                    Ok(update) => self.apply_mark(update),
                    Err(e) => {
                        debug!(error = %e, "Malformed mark price entry");
                        None
                    }
                })
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(symbol: &str, perms: &[&str]) -> SpotSymbolInfo {
        SpotSymbolInfo {
            symbol: symbol.to_string(),
            status: "TRADING".to_string(),
            base_asset: String::new(),
            quote_asset: "USDT".to_string(),
            permission_sets: vec![perms.iter().map(|p| p.to_string()).collect()],
            permissions: Vec::new(),
        }
    }

    fn state() -> BinanceState {
        let mut state = BinanceState::default();
        state.apply_metadata(BinanceMetadata {
            spot: vec![spot("BTCUSDT", &["SPOT", "MARGIN"]), spot("NEWUSDT", &["SPOT"])],
            funding_info: vec![FundingInfo {
                symbol: "NEWUSDT".to_string(),
                funding_interval_hours: 4,
            }],
            open_interest: Some(HashMap::from([("BTCUSDT".to_string(), 2.0)])),
        });
        state
    }

    #[test]
    fn test_mark_array_and_rows() {
        let mut state = state();
        let touched = state
            .apply_message(
                r#"[
                {"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"50000","i":"49990","r":"0.0001","T":2},
                {"e":"markPriceUpdate","E":1,"s":"NEWUSDT","p":"2","i":"2","r":"0.0001","T":2},
                {"e":"markPriceUpdate","E":1,"s":"ETHUSDC","p":"3000","i":"3000","r":"0.0001","T":2},
                {"e":"markPriceUpdate","s":"BROKEN"}
            ]"#,
            )
            .unwrap();
        assert_eq!(touched, vec!["BTCUSDT".to_string(), "NEWUSDT".to_string()]);

        let rows = state.table_data();
        assert_eq!(rows.len(), 2);
        let btc = rows.iter().find(|r| r.symbol == "BTC").unwrap();
        assert!((btc.funding_rate_apr - 10.95).abs() < 1e-9);
        assert_eq!(btc.open_interest_usd, 100_000.0);
        assert_eq!(btc.index_price, 49990.0);

        // 4h contract pays twice as often as the default
        let new = rows.iter().find(|r| r.symbol == "NEW").unwrap();
        assert!((new.funding_rate_apr - 21.9).abs() < 1e-9);
        assert_eq!(new.open_interest_usd, 0.0);
    }

    #[test]
    fn test_latest_mark_replaces_previous() {
        let mut state = state();
        state
            .apply_message(r#"[{"s":"BTCUSDT","p":"1","i":"1","r":"0.0001","T":0}]"#)
            .unwrap();
        state
            .apply_message(r#"[{"s":"BTCUSDT","p":"2","i":"2","r":"-0.0001","T":0}]"#)
            .unwrap();
        let rows = state.table_data();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mark_price, 2.0);
        assert!(rows[0].funding_rate_apr < 0.0);
    }

    #[test]
    fn test_rows_without_funding_are_skipped() {
        let mut state = state();
        state
            .apply_message(r#"[{"s":"BTCUSDT","p":"1","i":"1","r":"","T":0}]"#)
            .unwrap();
        assert!(state.table_data().is_empty());
    }

    #[test]
    fn test_acks_and_errors() {
        let mut state = state();
        assert!(state.apply_message(r#"{"result":null,"id":1}"#).unwrap().is_empty());
        let err = state
            .apply_message(r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Subscription { .. }));
        assert!(err.is_fatal_to_stream());
    }

    #[test]
    fn test_backend_outage_keeps_open_interest() {
        let mut state = state();
        state.apply_metadata(BinanceMetadata {
            spot: vec![spot("BTCUSDT", &["SPOT"])],
            funding_info: Vec::new(),
            open_interest: None,
        });
        state
            .apply_message(r#"[{"s":"BTCUSDT","p":"10","i":"10","r":"0.0001","T":0}]"#)
            .unwrap();
        assert_eq!(state.table_data()[0].open_interest_usd, 20.0);
        assert!(!state.is_margin_available("BTC"));
    }

    #[test]
    fn test_spot_and_margin_predicates() {
        let state = state();
        assert!(state.is_spot_available("BTC"));
        assert!(state.is_margin_available("BTC"));
        assert!(state.is_spot_available("NEW"));
        assert!(!state.is_margin_available("NEW"));
        assert!(!state.is_spot_available("DOGE"));
    }
}
