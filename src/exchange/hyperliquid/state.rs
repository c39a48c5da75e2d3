//! Hyperliquid snapshot state.
//!
//! There is no push stream: each poll replaces the whole asset list.

use std::collections::HashSet;
use tracing::trace;

use super::types::{HyperliquidAsset, SpotMeta};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{NormalizedQuote, Venue};
use crate::utils::decimal::to_f64;
use crate::utils::normalize::annualize_apr;

const VENUE: Venue = Venue::Hyperliquid;

/// Funding settles every hour.
pub const FUNDING_INTERVAL_HOURS: f64 = 1.0;

/// Spot pairs on Hyperliquid are quoted in USDC.
const SPOT_QUOTE: &str = "USDC";

#[derive(Debug, Default)]
pub struct HyperliquidState {
    assets: Vec<HyperliquidAsset>,
    spot_bases: HashSet<String>,
}

impl HyperliquidState {
    pub fn apply_assets(&mut self, assets: Vec<HyperliquidAsset>) {
        self.assets = assets;
    }

    pub fn apply_spot_meta(&mut self, meta: &SpotMeta) {
        self.spot_bases = meta.bases_quoted_in(SPOT_QUOTE).into_iter().collect();
    }

    pub fn table_data(&self) -> Vec<NormalizedQuote> {
        self.assets
            .iter()
            .filter(|a| !a.is_delisted)
            .filter_map(|a| match row(a) {
                Ok(row) => Some(row),
                Err(e) => {
                    trace!(error = %e, "Skipping row");
                    None
                }
            })
            .collect()
    }

    pub fn is_spot_available(&self, base: &str) -> bool {
        self.spot_bases.contains(base)
    }
}

fn row(asset: &HyperliquidAsset) -> ExchangeResult<NormalizedQuote> {
    let gap = |field| ExchangeError::data_gap(VENUE, &asset.name, field);
    let rate = to_f64(asset.funding_rate).ok_or_else(|| gap("funding rate"))?;
    let mark_price = to_f64(asset.mark_price).ok_or_else(|| gap("mark price"))?;
    let index_price = to_f64(asset.oracle_price).ok_or_else(|| gap("oracle price"))?;
    let open_interest_usd = to_f64(asset.open_interest)
        .map(|coins| coins * mark_price)
        .unwrap_or(0.0);

    Ok(NormalizedQuote {
        exchange: VENUE,
        symbol: asset.name.clone(),
        funding_rate_apr: annualize_apr(rate, FUNDING_INTERVAL_HOURS),
        mark_price,
        index_price,
        open_interest_usd,
    })
}
