//! Bybit per-symbol state and stream reconciliation.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use super::types::{LinearInstrument, LinearTicker, SpotInstrument, WsFrame};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::shared::StreamState;
use crate::exchange::{NormalizedQuote, Venue};
use crate::utils::decimal::to_f64;
use crate::utils::normalize::{
    annualize_apr, quote_symbol, resolve_interval_hours, strip_quote, FundingInterval,
    DEFAULT_FUNDING_INTERVAL_HOURS,
};

const VENUE: Venue = Venue::Bybit;
const TICKER_TOPIC: &str = "tickers.";

#[derive(Debug, Clone, Default)]
pub struct BybitMetadata {
    pub linear: Vec<LinearInstrument>,
    pub spot: Vec<SpotInstrument>,
}

#[derive(Debug, Default)]
pub struct BybitState {
    instruments: HashMap<String, LinearInstrument>,
    spot: HashMap<String, SpotInstrument>,
    tickers: BTreeMap<String, LinearTicker>,
}

impl BybitState {
    pub fn apply_metadata(&mut self, meta: BybitMetadata) {
        self.instruments = meta
            .linear
            .into_iter()
            .filter(LinearInstrument::is_tracked)
            .map(|i| (i.symbol.clone(), i))
            .collect();
        self.spot = meta.spot.into_iter().map(|s| (s.symbol.clone(), s)).collect();
    }

    /// Seed tickers from the REST snapshot.
    pub fn apply_tickers(&mut self, tickers: Vec<LinearTicker>) {
        for ticker in tickers {
            self.upsert(true, ticker);
        }
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.instruments.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Snapshot replaces, delta merges. Untracked symbols are ignored.
    fn upsert(&mut self, snapshot: bool, ticker: LinearTicker) -> Option<String> {
        if !self.instruments.contains_key(&ticker.symbol) {
            trace!(symbol = %ticker.symbol, "Ignoring untracked symbol");
            return None;
        }
        let symbol = ticker.symbol.clone();
        match self.tickers.get_mut(&symbol) {
            Some(existing) if !snapshot => existing.merge(ticker),
            _ => {
                self.tickers.insert(symbol.clone(), ticker);
            }
        }
        Some(symbol)
    }

    pub fn table_data(&self) -> Vec<NormalizedQuote> {
        self.tickers
            .values()
            .filter_map(|t| match self.row(t) {
                Ok(row) => Some(row),
                Err(e) => {
                    trace!(error = %e, "Skipping row");
                    None
                }
            })
            .collect()
    }

    fn row(&self, ticker: &LinearTicker) -> ExchangeResult<NormalizedQuote> {
        let gap = |field| ExchangeError::data_gap(VENUE, &ticker.symbol, field);
        let rate = ticker.funding_rate.and_then(to_f64).ok_or_else(|| gap("funding rate"))?;
        let mark_price = ticker.mark_price.and_then(to_f64).ok_or_else(|| gap("mark price"))?;
        let index_price = ticker.index_price.and_then(to_f64).ok_or_else(|| gap("index price"))?;

        let interval = self
            .instruments
            .get(&ticker.symbol)
            .and_then(|i| i.funding_interval)
            .map(|minutes| FundingInterval::Minutes(minutes as f64));
        let hours = resolve_interval_hours(interval, DEFAULT_FUNDING_INTERVAL_HOURS);

        let open_interest_usd = ticker
            .open_interest_value
            .and_then(to_f64)
            .or_else(|| ticker.open_interest.and_then(to_f64).map(|qty| qty * mark_price))
            .unwrap_or(0.0);

        Ok(NormalizedQuote {
            exchange: VENUE,
            symbol: strip_quote(&ticker.symbol).to_string(),
            funding_rate_apr: annualize_apr(rate, hours),
            mark_price,
            index_price,
            open_interest_usd,
        })
    }

    pub fn is_spot_available(&self, base: &str) -> bool {
        self.spot
            .get(&quote_symbol(base))
            .map(|s| s.status == "Trading")
            .unwrap_or(false)
    }

    pub fn is_margin_available(&self, base: &str) -> bool {
        self.spot
            .get(&quote_symbol(base))
            .map(|s| s.status == "Trading" && !s.margin_trading.is_empty() && s.margin_trading != "none")
            .unwrap_or(false)
    }
}

impl StreamState for BybitState {
    fn apply_message(&mut self, text: &str) -> ExchangeResult<Vec<String>> {
        let frame: WsFrame = serde_json::from_str(text).map_err(|e| ExchangeError::Decode {
            venue: VENUE,
            url: "stream".to_string(),
            source: e,
        })?;

        if let Some(op) = frame.op {
            if frame.success == Some(false) {
                let msg = frame.ret_msg.unwrap_or_default();
                return Err(if op == "subscribe" {
                    ExchangeError::Subscription {
                        venue: VENUE,
                        code: op,
                        msg,
                    }
                } else {
                    ExchangeError::Protocol {
                        venue: VENUE,
                        code: op,
                        msg,
                    }
                });
            }
            debug!(%op, "Operation acknowledged");
            return Ok(Vec::new());
        }

        let is_ticker = frame
            .topic
            .as_deref()
            .map(|t| t.starts_with(TICKER_TOPIC))
            .unwrap_or(false);
        match (is_ticker, frame.data) {
            (true, Some(ticker)) => {
                let snapshot = frame.kind.as_deref() == Some("snapshot");
                Ok(self.upsert(snapshot, ticker).into_iter().collect())
            }
            _ => Ok(Vec::new()),
        }
    }
}
