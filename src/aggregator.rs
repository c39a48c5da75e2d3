//! Cross-venue view: every adapter's rows merged and ranked by APR, plus
//! per-symbol spot and margin availability.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::exchange::{ExchangeAdapter, NormalizedQuote, Venue};

/// Venues per base symbol.
pub type Availability = BTreeMap<String, BTreeSet<Venue>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedView {
    /// Descending by APR; equal APRs keep adapter order.
    pub rows: Vec<NormalizedQuote>,
    pub spot: Availability,
    pub margin: Availability,
    /// Epoch millis
    pub computed_at: i64,
}

impl AggregatedView {
    pub fn spot_venues(&self, symbol: &str) -> Option<&BTreeSet<Venue>> {
        self.spot.get(symbol)
    }

    pub fn margin_venues(&self, symbol: &str) -> Option<&BTreeSet<Venue>> {
        self.margin.get(symbol)
    }

    /// Rows for one base symbol across venues, still in APR order.
    pub fn rows_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a NormalizedQuote> + 'a {
        self.rows.iter().filter(move |row| row.symbol == symbol)
    }
}

/// Build one view from whatever each adapter currently holds.
pub fn aggregate(adapters: &[Arc<dyn ExchangeAdapter>], computed_at: i64) -> AggregatedView {
    let mut rows: Vec<NormalizedQuote> = adapters.iter().flat_map(|a| a.table_data()).collect();
    rows.sort_by(|a, b| b.funding_rate_apr.total_cmp(&a.funding_rate_apr));

    let symbols: BTreeSet<&str> = rows.iter().map(|row| row.symbol.as_str()).collect();
    let mut spot = Availability::new();
    let mut margin = Availability::new();
    for symbol in symbols {
        for adapter in adapters {
            if adapter.is_spot_available(symbol) {
                spot.entry(symbol.to_string()).or_default().insert(adapter.venue());
            }
            if adapter.is_margin_available(symbol) {
                margin.entry(symbol.to_string()).or_default().insert(adapter.venue());
            }
        }
    }

    AggregatedView {
        rows,
        spot,
        margin,
        computed_at,
    }
}

/// Owns the active adapters and republishes the aggregated view every tick.
pub struct Aggregator {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    view: watch::Receiver<Arc<AggregatedView>>,
    ticker: JoinHandle<()>,
}

impl Aggregator {
    /// Initialize every adapter concurrently and start ticking.
    ///
    /// Adapters that fail to initialize are logged and left out.
    pub async fn start(adapters: Vec<Arc<dyn ExchangeAdapter>>, tick: Duration) -> Self {
        let results = join_all(adapters.iter().map(|a| a.init())).await;

        let active: Vec<Arc<dyn ExchangeAdapter>> = adapters
            .into_iter()
            .zip(results)
            .filter_map(|(adapter, result)| match result {
                Ok(()) => Some(adapter),
                Err(e) => {
                    error!(venue = %adapter.venue(), error = %e, "Adapter failed to initialize, leaving it out");
                    None
                }
            })
            .collect();

        info!(
            active = active.len(),
            venues = ?active.iter().map(|a| a.venue()).collect::<Vec<_>>(),
            "Aggregator started"
        );

        let (publish, view) = watch::channel(Arc::new(AggregatedView::default()));
        let ticker = spawn_ticker(active.clone(), tick, publish);

        Self {
            adapters: active,
            view,
            ticker,
        }
    }

    /// Venues that initialized successfully.
    pub fn active_venues(&self) -> Vec<Venue> {
        self.adapters.iter().map(|a| a.venue()).collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregatedView>> {
        self.view.clone()
    }

    /// Latest published view.
    pub fn current(&self) -> Arc<AggregatedView> {
        self.view.borrow().clone()
    }

    /// Stop ticking and destroy every active adapter.
    pub async fn shutdown(self) {
        self.ticker.abort();
        join_all(self.adapters.iter().map(|a| a.destroy())).await;
        info!("Aggregator stopped");
    }
}

fn spawn_ticker(
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    tick: Duration,
    publish: watch::Sender<Arc<AggregatedView>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let view = aggregate(&adapters, Utc::now().timestamp_millis());
            debug!(rows = view.rows.len(), "Aggregated tick");
            if publish.send(Arc::new(view)).is_err() {
                // Every receiver is gone
                return;
            }
        }
    })
}
