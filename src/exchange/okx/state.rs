//! OKX per-instrument state, assembled from several channels.
//!
//! Funding, mark price, index price and open interest arrive on separate
//! channels. Each push is a full record for its key and replaces the previous
//! one; a row exists for every instrument with a funding record.

use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

use super::types::{FundingRate, IndexTicker, Instrument, MarkPrice, OpenInterest, WsFrame};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::shared::StreamState;
use crate::exchange::{NormalizedQuote, Venue};
use crate::utils::decimal::to_f64;
use crate::utils::normalize::{
    annualize_apr, base_of_inst_id, resolve_interval_hours, FundingInterval,
    DEFAULT_FUNDING_INTERVAL_HOURS, QUOTE_ASSET,
};

const VENUE: Venue = Venue::Okx;
const SWAP_SUFFIX: &str = "-SWAP";

/// Index id of a swap (`BTC-USDT-SWAP` -> `BTC-USDT`).
pub fn index_id(inst_id: &str) -> &str {
    inst_id.strip_suffix(SWAP_SUFFIX).unwrap_or(inst_id)
}

fn usdt_swap_suffix() -> String {
    format!("-{}{}", QUOTE_ASSET, SWAP_SUFFIX)
}

/// REST baseline.
#[derive(Debug, Clone, Default)]
pub struct OkxBaseline {
    pub swaps: Vec<Instrument>,
    pub marks: Vec<MarkPrice>,
    pub index: Vec<IndexTicker>,
    pub open_interest: Vec<OpenInterest>,
}

/// Listing predicates, refreshed on a timer.
#[derive(Debug, Clone, Default)]
pub struct OkxMetadata {
    pub spot: Vec<Instrument>,
    pub margin: Vec<Instrument>,
}

#[derive(Debug, Default)]
pub struct OkxState {
    swaps: HashMap<String, Instrument>,
    funding: BTreeMap<String, FundingRate>,
    marks: HashMap<String, MarkPrice>,
    index: HashMap<String, IndexTicker>,
    open_interest: HashMap<String, OpenInterest>,
    spot: HashSet<String>,
    margin: HashSet<String>,
}

impl OkxState {
    pub fn apply_baseline(&mut self, baseline: OkxBaseline) {
        self.swaps = baseline
            .swaps
            .into_iter()
            .map(|i| (i.inst_id.clone(), i))
            .collect();
        for mark in baseline.marks {
            self.upsert_mark(mark);
        }
        for index in baseline.index {
            self.upsert_index(index);
        }
        for oi in baseline.open_interest {
            self.upsert_open_interest(oi);
        }
    }

    pub fn apply_metadata(&mut self, meta: OkxMetadata) {
        let live = |list: Vec<Instrument>| -> HashSet<String> {
            list.into_iter().filter(Instrument::is_live).map(|i| i.inst_id).collect()
        };
        self.spot = live(meta.spot);
        self.margin = live(meta.margin);
    }

    /// Live USDT-margined swaps, sorted.
    pub fn tracked_inst_ids(&self) -> Vec<String> {
        let suffix = usdt_swap_suffix();
        let mut ids: Vec<String> = self
            .swaps
            .values()
            .filter(|i| i.is_live() && i.inst_id.ends_with(&suffix))
            .map(|i| i.inst_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Listed, live and USDT-margined.
    fn is_tracked(&self, inst_id: &str) -> bool {
        inst_id.ends_with(&usdt_swap_suffix())
            && self.swaps.get(inst_id).is_some_and(Instrument::is_live)
    }

    fn upsert_funding(&mut self, record: FundingRate) -> Option<String> {
        if !self.is_tracked(&record.inst_id) {
            return None;
        }
        let id = record.inst_id.clone();
        self.funding.insert(id.clone(), record);
        Some(id)
    }

    fn upsert_mark(&mut self, record: MarkPrice) -> Option<String> {
        if !self.is_tracked(&record.inst_id) {
            return None;
        }
        let id = record.inst_id.clone();
        self.marks.insert(id.clone(), record);
        Some(id)
    }

    fn upsert_index(&mut self, record: IndexTicker) -> Option<String> {
        let swap_id = format!("{}{}", record.inst_id, SWAP_SUFFIX);
        if !self.is_tracked(&swap_id) {
            return None;
        }
        self.index.insert(record.inst_id.clone(), record);
        Some(swap_id)
    }

    fn upsert_open_interest(&mut self, record: OpenInterest) -> Option<String> {
        if !self.is_tracked(&record.inst_id) {
            return None;
        }
        let id = record.inst_id.clone();
        self.open_interest.insert(id.clone(), record);
        Some(id)
    }

    /// Returns the id only when a state change shows or hides an existing row.
    fn upsert_instrument(&mut self, record: Instrument) -> Option<String> {
        let id = record.inst_id.clone();
        let was_tracked = self.is_tracked(&id);
        self.swaps.insert(id.clone(), record);
        (was_tracked != self.is_tracked(&id) && self.funding.contains_key(&id)).then_some(id)
    }

    pub fn table_data(&self) -> Vec<NormalizedQuote> {
        self.funding
            .values()
            .filter(|f| self.is_tracked(&f.inst_id))
            .filter_map(|f| match self.row(f) {
                Ok(row) => Some(row),
                Err(e) => {
                    trace!(error = %e, "Skipping row");
                    None
                }
            })
            .collect()
    }

    fn row(&self, funding: &FundingRate) -> ExchangeResult<NormalizedQuote> {
        let id = funding.inst_id.as_str();
        let gap = |field| ExchangeError::data_gap(VENUE, id, field);
        let rate = funding.funding_rate.and_then(to_f64).ok_or_else(|| gap("funding rate"))?;
        let mark_price = self
            .marks
            .get(id)
            .and_then(|m| m.mark_px)
            .and_then(to_f64)
            .ok_or_else(|| gap("mark price"))?;
        let index_price = self
            .index
            .get(index_id(id))
            .and_then(|i| i.idx_px)
            .and_then(to_f64)
            .ok_or_else(|| gap("index price"))?;

        let interval = funding.interval_millis().map(FundingInterval::Millis);
        let hours = resolve_interval_hours(interval, DEFAULT_FUNDING_INTERVAL_HOURS);

        let open_interest_usd = self
            .open_interest
            .get(id)
            .and_then(|oi| oi.oi_ccy)
            .and_then(to_f64)
            .map(|coins| coins * mark_price)
            .unwrap_or(0.0);

        Ok(NormalizedQuote {
            exchange: VENUE,
            symbol: base_of_inst_id(id).to_string(),
            funding_rate_apr: annualize_apr(rate, hours),
            mark_price,
            index_price,
            open_interest_usd,
        })
    }

    fn spot_id(base: &str) -> String {
        format!("{}-{}", base, QUOTE_ASSET)
    }

    pub fn is_spot_available(&self, base: &str) -> bool {
        self.spot.contains(&Self::spot_id(base))
    }

    pub fn is_margin_available(&self, base: &str) -> bool {
        self.margin.contains(&Self::spot_id(base))
    }
}

/// Decode each record of a push, dropping malformed ones.
fn decode_all<T: DeserializeOwned>(channel: &str, data: Vec<serde_json::Value>) -> Vec<T> {
    data.into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(channel, error = %e, "Malformed record");
                None
            }
        })
        .collect()
}

impl StreamState for OkxState {
    fn apply_message(&mut self, text: &str) -> ExchangeResult<Vec<String>> {
        if text == "pong" {
            return Ok(Vec::new());
        }

        let frame: WsFrame = serde_json::from_str(text).map_err(|e| ExchangeError::Decode {
            venue: VENUE,
            url: "stream".to_string(),
            source: e,
        })?;

        match frame.event.as_deref() {
            Some("error") => {
                return Err(ExchangeError::Subscription {
                    venue: VENUE,
                    code: frame
                        .code
                        .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
                        .unwrap_or_default(),
                    msg: frame.msg.unwrap_or_default(),
                })
            }
            Some(event) => {
                debug!(event, arg = ?frame.arg, "Stream event");
                return Ok(Vec::new());
            }
            None => {}
        }

        let Some(arg) = frame.arg else {
            return Ok(Vec::new());
        };
        let channel = arg.channel.as_str();
        let touched: Vec<Option<String>> = match channel {
            "funding-rate" => decode_all(channel, frame.data)
                .into_iter()
                .map(|r| self.upsert_funding(r))
                .collect(),
            "mark-price" => decode_all(channel, frame.data)
                .into_iter()
                .map(|r| self.upsert_mark(r))
                .collect(),
            "index-tickers" => decode_all(channel, frame.data)
                .into_iter()
                .map(|r| self.upsert_index(r))
                .collect(),
            "open-interest" => decode_all(channel, frame.data)
                .into_iter()
                .map(|r| self.upsert_open_interest(r))
                .collect(),
            "instruments" => decode_all(channel, frame.data)
                .into_iter()
                .map(|r| self.upsert_instrument(r))
                .collect(),
            other => {
                trace!(channel = other, "Ignoring channel");
                Vec::new()
            }
        };
        Ok(touched.into_iter().flatten().collect())
    }
}
