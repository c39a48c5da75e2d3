//! Exchange integrations.
//!
//! Every venue implements [`ExchangeAdapter`]: a REST baseline reconciled with
//! a live push stream (or, for Hyperliquid, a REST poll) into one per-symbol
//! state, exposed as [`NormalizedQuote`] rows.
//!
//! | Venue | Live source |
//! |---|---|
//! | Binance | `!markPrice@arr` |
//! | Bitget | `ticker` channel |
//! | Bybit | `tickers.{symbol}` |
//! | OKX | funding-rate, mark-price, index-tickers, open-interest |
//! | Hyperliquid | `metaAndAssetCtxs` poll |
//! | Aster | `!markPrice@arr@1s` |

pub mod aster;
pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod hyperliquid;
pub mod okx;
pub mod rest;
pub mod shared;
pub mod stream;
mod traits;

use std::sync::Arc;

pub use aster::AsterAdapter;
pub use binance::BinanceAdapter;
pub use bitget::BitgetAdapter;
pub use bybit::BybitAdapter;
pub use hyperliquid::{HyperliquidAdapter, HyperliquidClient};
pub use okx::OkxAdapter;
pub use rest::RestClient;
pub use traits::*;

use crate::config::Config;
use crate::error::ExchangeResult;

/// Construct the adapter for `venue` from configuration.
///
/// Nothing is fetched or opened until `init()` is called.
pub fn build_adapter(venue: Venue, config: &Config) -> ExchangeResult<Arc<dyn ExchangeAdapter>> {
    let endpoints = &config.endpoints;
    let settings = &config.adapters;
    let adapter: Arc<dyn ExchangeAdapter> = match venue {
        Venue::Binance => Arc::new(BinanceAdapter::new(&endpoints.binance, settings)?),
        Venue::Bitget => Arc::new(BitgetAdapter::new(&endpoints.bitget, settings)?),
        Venue::Bybit => Arc::new(BybitAdapter::new(&endpoints.bybit, settings)?),
        Venue::Okx => Arc::new(OkxAdapter::new(&endpoints.okx, settings)?),
        Venue::Hyperliquid => Arc::new(HyperliquidAdapter::new(&endpoints.hyperliquid, settings)?),
        Venue::Aster => Arc::new(AsterAdapter::new(&endpoints.aster, settings)?),
    };
    Ok(adapter)
}

/// Adapters for every venue enabled in `config.adapters.enabled`.
pub fn build_enabled(config: &Config) -> ExchangeResult<Vec<Arc<dyn ExchangeAdapter>>> {
    config
        .adapters
        .enabled
        .iter()
        .map(|venue| build_adapter(*venue, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_every_venue() {
        let config = Config::default();
        for venue in Venue::ALL {
            let adapter = build_adapter(venue, &config).unwrap();
            assert_eq!(adapter.venue(), venue);
            assert_eq!(adapter.status(), AdapterStatus::Uninitialized);
            assert!(adapter.table_data().is_empty());
        }
    }

    #[test]
    fn test_build_enabled_respects_list() {
        let mut config = Config::default();
        config.adapters.enabled = vec![Venue::Okx, Venue::Aster];
        let adapters = build_enabled(&config).unwrap();
        let venues: Vec<Venue> = adapters.iter().map(|a| a.venue()).collect();
        assert_eq!(venues, vec![Venue::Okx, Venue::Aster]);
    }
}
