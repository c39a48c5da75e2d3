//! Backend polling caches and their HTTP surface.
//!
//! Three caches stand in front of REST endpoints that are too slow or too
//! rate limited to hit from every adapter:
//! - Bitget current fund rate (settlement period per contract)
//! - Binance open interest
//! - Aster funding history (settlement period inferred from it)

pub mod aster;
pub mod binance;
pub mod bitget;
pub mod cache;
pub mod server;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use aster::{AsterFundingCache, AsterFundingSource};
pub use binance::{BinanceOpenInterestCache, BinanceOpenInterestSource};
pub use bitget::{BitgetFundRateCache, BitgetFundRateSource};
pub use cache::{CacheEntry, PollSource, PollingCache, RefreshReport};

use crate::config::Config;
use crate::error::ExchangeResult;

/// The three caches served by `serve`.
pub struct Backend {
    pub bitget: Arc<BitgetFundRateCache>,
    pub binance: Arc<BinanceOpenInterestCache>,
    pub aster: Arc<AsterFundingCache>,
    refresh_every: Duration,
}

impl Backend {
    pub fn new(config: &Config) -> ExchangeResult<Self> {
        let backend = &config.backend;
        let timeout = backend.request_timeout();
        let endpoints = &config.endpoints;

        Ok(Self {
            bitget: Arc::new(PollingCache::new(
                BitgetFundRateSource::new(&endpoints.bitget.rest, timeout)?,
                Duration::from_millis(backend.bitget_pace_ms),
            )),
            binance: Arc::new(PollingCache::new(
                BinanceOpenInterestSource::new(&endpoints.binance.futures_rest, timeout)?,
                Duration::from_millis(backend.binance_pace_ms),
            )),
            aster: Arc::new(PollingCache::new(
                AsterFundingSource::new(&endpoints.aster.rest, backend.aster_history_limit, timeout)?,
                Duration::from_millis(backend.aster_pace_ms),
            )),
            refresh_every: backend.refresh_interval(),
        })
    }

    /// Refresh every cache once (concurrently), then start their timers.
    ///
    /// Resolves only when all three have a first snapshot. If any of them
    /// fails, the timers of the others are aborted before the error returns.
    pub async fn start(&self) -> ExchangeResult<Vec<JoinHandle<()>>> {
        info!("Initializing backend caches...");
        let (bitget, binance, aster) = tokio::join!(
            self.bitget.start(self.refresh_every),
            self.binance.start(self.refresh_every),
            self.aster.start(self.refresh_every),
        );

        let mut timers = Vec::with_capacity(3);
        let mut failure = None;
        for result in [bitget, binance, aster] {
            match result {
                Ok(timer) => timers.push(timer),
                Err(e) => {
                    error!(error = %e, "Backend cache failed its first refresh");
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            for timer in &timers {
                timer.abort();
            }
            return Err(e);
        }

        info!(
            every_secs = self.refresh_every.as_secs(),
            "Backend caches ready"
        );
        Ok(timers)
    }
}
