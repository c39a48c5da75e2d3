//! Aster per-symbol state.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

use super::types::{FundingRateInterval, SymbolInfo};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::binance::types::MarkPriceUpdate;
use crate::exchange::shared::StreamState;
use crate::exchange::{NormalizedQuote, Venue};
use crate::utils::decimal::to_f64;
use crate::utils::normalize::{
    annualize_apr, resolve_interval_hours, strip_quote, FundingInterval,
    DEFAULT_FUNDING_INTERVAL_HOURS,
};

const VENUE: Venue = Venue::Aster;

#[derive(Debug, Clone, Default)]
pub struct AsterMetadata {
    pub symbols: Vec<SymbolInfo>,
    /// `None` when the backend could not be reached; previous values are kept.
    pub intervals: Option<Vec<FundingRateInterval>>,
}

#[derive(Debug, Default)]
pub struct AsterState {
    trading: HashSet<String>,
    interval_millis: HashMap<String, i64>,
    marks: BTreeMap<String, MarkPriceUpdate>,
}

impl AsterState {
    pub fn apply_metadata(&mut self, meta: AsterMetadata) {
        self.trading = meta
            .symbols
            .into_iter()
            .filter(SymbolInfo::is_trading)
            .map(|s| s.symbol)
            .collect();
        if let Some(intervals) = meta.intervals {
            self.interval_millis = intervals
                .into_iter()
                .map(|i| (i.symbol, i.funding_interval))
                .collect();
        }
    }

    pub fn table_data(&self) -> Vec<NormalizedQuote> {
        self.marks
            .values()
            .filter(|m| self.trading.contains(&m.symbol))
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
            .interval_millis
            .get(&mark.symbol)
            .map(|ms| FundingInterval::Millis(*ms));
        let hours = resolve_interval_hours(interval, DEFAULT_FUNDING_INTERVAL_HOURS);

        Ok(NormalizedQuote {
            exchange: VENUE,
            symbol: strip_quote(&mark.symbol).to_string(),
            funding_rate_apr: annualize_apr(rate, hours),
            mark_price,
            index_price,
            // Not published
            open_interest_usd: 0.0,
        })
    }
}

impl StreamState for AsterState {
    fn apply_message(&mut self, text: &str) -> ExchangeResult<Vec<String>> {
        let items: Vec<serde_json::Value> =
            serde_json::from_str(text).map_err(|e| ExchangeError::Decode {
                venue: VENUE,
                url: "stream".to_string(),
                source: e,
            })?;

        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<MarkPriceUpdate>(item) {
                Ok(update) if self.trading.contains(&update.symbol) => {
                    let symbol = update.symbol.clone();
                    self.marks.insert(symbol.clone(), update);
                    Some(symbol)
                }
                Ok(update) => {
                    trace!(symbol = %update.symbol, "Ignoring untracked symbol");
                    None
                }
                Err(e) => {
                    debug!(error = %e, "Malformed mark price entry");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, status: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: name.to_string(),
            status: status.to_string(),
            contract_type: "PERPETUAL".to_string(),
            quote_asset: "USDT".to_string(),
        }
    }

    fn state() -> AsterState {
        let mut state = AsterState::default();
        state.apply_metadata(AsterMetadata {
            symbols: vec![
                symbol("BTCUSDT", "TRADING"),
                symbol("ETHUSDT", "TRADING"),
                symbol("OLDUSDT", "SETTLING"),
            ],
            intervals: Some(vec![FundingRateInterval {
                symbol: "ETHUSDT".to_string(),
                funding_interval: 4 * 60 * 60 * 1000,
            }]),
        });
        state
    }

    #[test]
    fn test_rows_from_mark_array() {
        let mut state = state();
        let touched = state
            .apply_message(
                r#"[{"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"50000","i":"50010","P":"0","r":"0.0001","T":2},
                    {"e":"markPriceUpdate","E":1,"s":"ETHUSDT","p":"3000","i":"3000","P":"0","r":"0.0001","T":2},
                    {"e":"markPriceUpdate","E":1,"s":"OLDUSDT","p":"1","i":"1","P":"0","r":"0.0001","T":2}]"#,
            )
            .unwrap();
        assert_eq!(touched, vec!["BTCUSDT", "ETHUSDT"]);

        let rows = state.table_data();
        assert_eq!(rows.len(), 2);
        // No interval reported for BTC, so the 8h default applies
        assert!((rows[0].funding_rate_apr - 10.95).abs() < 1e-9);
        assert!((rows[1].funding_rate_apr - 21.9).abs() < 1e-9);
        assert!(rows.iter().all(|r| r.open_interest_usd == 0.0));
    }

    #[test]
    fn test_delisting_hides_row() {
        let mut state = state();
        state
            .apply_message(r#"[{"s":"BTCUSDT","p":"1","i":"1","r":"0.0001","T":0}]"#)
            .unwrap();
        state.apply_metadata(AsterMetadata {
            symbols: vec![symbol("BTCUSDT", "SETTLING")],
            intervals: None,
        });
        assert!(state.table_data().is_empty());
    }

    #[test]
    fn test_backend_outage_keeps_intervals() {
        let mut state = state();
        state.apply_metadata(AsterMetadata {
            symbols: vec![symbol("ETHUSDT", "TRADING")],
            intervals: None,
        });
        state
            .apply_message(r#"[{"s":"ETHUSDT","p":"1","i":"1","r":"0.0001","T":0}]"#)
            .unwrap();
        assert!((state.table_data()[0].funding_rate_apr - 21.9).abs() < 1e-9);
    }
}
