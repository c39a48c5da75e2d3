//! Bitget per-symbol state and stream reconciliation.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

use super::types::{CurrentFundRate, MarginCurrency, SpotSymbol, Ticker, WsFrame};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::shared::StreamState;
use crate::exchange::{NormalizedQuote, Venue};
use crate::utils::decimal::to_f64;
use crate::utils::normalize::{annualize_apr, quote_symbol, strip_quote};

const VENUE: Venue = Venue::Bitget;

/// Data refreshed on the metadata timer.
#[derive(Debug, Clone, Default)]
pub struct BitgetMetadata {
    pub fund_rates: HashMap<String, CurrentFundRate>,
    pub spot: Vec<SpotSymbol>,
    pub margin: Vec<MarginCurrency>,
}

#[derive(Debug, Default)]
pub struct BitgetState {
    /// Subscribed contracts; the stream may only push these.
    tickers: BTreeMap<String, Ticker>,
    fund_rates: HashMap<String, CurrentFundRate>,
    spot: HashSet<String>,
    margin: HashSet<String>,
}

impl BitgetState {
    /// Seed the tracked set from the REST tickers snapshot.
    pub fn apply_tickers(&mut self, tickers: Vec<Ticker>) {
        self.tickers = tickers
            .into_iter()
            .filter(Ticker::is_trading)
            .map(|t| (t.symbol.clone(), t))
            .collect();
    }

    pub fn apply_metadata(&mut self, meta: BitgetMetadata) {
        self.fund_rates = meta.fund_rates;
        self.spot = meta.spot.into_iter().map(|s| s.symbol).collect();
        self.margin = meta.margin.into_iter().map(|m| m.symbol).collect();
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.tickers.keys().cloned().collect()
    }

    /// Reconcile pushed tickers. A snapshot replaces the stored record and an
    /// update merges into it; either for an untracked contract is an error.
    pub fn apply_push(&mut self, snapshot: bool, data: Vec<Ticker>) -> ExchangeResult<Vec<String>> {
        let mut touched = Vec::with_capacity(data.len());
        for ticker in data {
            let Some(slot) = self.tickers.get_mut(&ticker.symbol) else {
                return Err(ExchangeError::UnexpectedSymbol {
                    venue: VENUE,
                    symbol: ticker.symbol,
                });
            };
            touched.push(ticker.symbol.clone());
            if snapshot {
                *slot = ticker;
            } else {
                slot.merge(ticker);
            }
        }
        Ok(touched)
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

    fn row(&self, ticker: &Ticker) -> ExchangeResult<NormalizedQuote> {
        let gap = |field| ExchangeError::data_gap(VENUE, &ticker.symbol, field);
        let record = self.fund_rates.get(&ticker.symbol).ok_or_else(|| gap("funding record"))?;
        let hours = record
            .funding_rate_interval
            .and_then(to_f64)
            .filter(|h| *h > 0.0)
            .ok_or_else(|| gap("funding interval"))?;
        let rate = ticker
            .funding_rate
            .or(Some(record.funding_rate))
            .and_then(to_f64)
            .ok_or_else(|| gap("funding rate"))?;
        let mark_price = ticker.mark_price.and_then(to_f64).ok_or_else(|| gap("mark price"))?;
        let index_price = ticker.index_price.and_then(to_f64).ok_or_else(|| gap("index price"))?;
        let open_interest_usd = ticker
            .holding_amount
            .and_then(to_f64)
            .map(|qty| qty * mark_price)
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
        self.spot.contains(&quote_symbol(base))
    }

    pub fn is_margin_available(&self, base: &str) -> bool {
        self.margin.contains(&quote_symbol(base))
    }
}

impl StreamState for BitgetState {
    fn apply_message(&mut self, text: &str) -> ExchangeResult<Vec<String>> {
        if text == "pong" {
            return Ok(Vec::new());
        }

        let frame: WsFrame = serde_json::from_str(text).map_err(|e| ExchangeError::Decode {
            venue: VENUE,
            url: "stream".to_string(),
            source: e,
        })?;

        match (frame.event.as_deref(), frame.action.as_deref()) {
            (Some("error"), _) => Err(ExchangeError::Subscription {
                venue: VENUE,
                code: frame.code.map(|c| c.to_string()).unwrap_or_default(),
                msg: frame.msg.unwrap_or_default(),
            }),
            (Some(event), _) => {
                debug!(event, arg = ?frame.arg, "Stream event");
                Ok(Vec::new())
            }
            (None, Some(action)) => self.apply_push(action == "snapshot", frame.data),
            (None, None) => Ok(Vec::new()),
        }
    }
}
