//! Generic polling cache in front of rate-limited REST endpoints.
//!
//! A refresh cycle lists the symbols, then fetches one detail record per
//! symbol with a fixed delay between requests. The new snapshot is published
//! only when the cycle completes, so readers always see a whole cycle.
//! Failures never discard a value that was fetched before.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::ExchangeResult;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::schedule::spawn_periodic;

/// Upstream a [`PollingCache`] pulls from.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    type Record: Clone + Send + Sync + 'static;

    /// Cache name used in logs.
    fn name(&self) -> &'static str;

    /// Top-level listing. A failure aborts the whole cycle.
    async fn list_symbols(&self) -> ExchangeResult<Vec<String>>;

    /// Per-symbol detail. A failure skips only this symbol.
    async fn fetch_detail(&self, symbol: &str) -> ExchangeResult<Self::Record>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Epoch millis of the refresh that produced `value`.
    pub last_refreshed_at: i64,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub listed: usize,
    pub refreshed: usize,
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

impl RefreshReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub type Snapshot<T> = Arc<HashMap<String, CacheEntry<T>>>;

pub struct PollingCache<S: PollSource> {
    source: S,
    pace: Duration,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Snapshot<S::Record>>,
    last_report: RwLock<Option<RefreshReport>>,
    // Serializes refresh cycles; readers never take it.
    cycle: Mutex<()>,
}

impl<S: PollSource> PollingCache<S> {
    pub fn new(source: S, pace: Duration) -> Self {
        Self::with_clock(source, pace, Arc::new(SystemClock))
    }

    pub fn with_clock(source: S, pace: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            pace,
            clock,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            last_report: RwLock::new(None),
            cycle: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    /// Run one refresh cycle.
    ///
    /// Returns `Err` only when the listing fails, in which case the previous
    /// snapshot stays in place. Per-symbol failures are collected in the report.
    #[instrument(skip(self), fields(cache = self.source.name()))]
    pub async fn refresh(&self) -> ExchangeResult<RefreshReport> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();

        let symbols = match self.source.list_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "Listing failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let mut next: HashMap<String, CacheEntry<S::Record>> = self.snapshot.read().as_ref().clone();
        let mut refreshed = 0;
        let mut failed = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
            match self.source.fetch_detail(symbol).await {
                Ok(value) => {
                    next.insert(
                        symbol.clone(),
                        CacheEntry {
                            value,
                            last_refreshed_at: self.clock.now_millis(),
                        },
                    );
                    refreshed += 1;
                }
                Err(e) => {
                    debug!(%symbol, error = %e, "Detail fetch failed, keeping prior value");
                    failed.push(symbol.clone());
                }
            }
        }

        *self.snapshot.write() = Arc::new(next);

        let report = RefreshReport {
            listed: symbols.len(),
            refreshed,
            failed,
            elapsed: started.elapsed(),
        };
        if report.is_partial() {
            warn!(
                listed = report.listed,
                failed = report.failed.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Refresh completed with failures"
            );
        } else {
            info!(
                listed = report.listed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Refreshed cache"
            );
        }
        *self.last_report.write() = Some(report.clone());
        Ok(report)
    }

    /// Last completed snapshot.
    pub fn snapshot(&self) -> Snapshot<S::Record> {
        self.snapshot.read().clone()
    }

    /// Values of the last completed snapshot, ordered by symbol.
    pub fn values(&self) -> BTreeMap<String, S::Record> {
        self.snapshot()
            .iter()
            .map(|(symbol, entry)| (symbol.clone(), entry.value.clone()))
            .collect()
    }

    pub fn get(&self, symbol: &str) -> Option<CacheEntry<S::Record>> {
        self.snapshot.read().get(symbol).cloned()
    }

    pub fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.read().clone()
    }
}

impl<S: PollSource> PollingCache<S> {
    /// Refresh once, then keep refreshing every `every` in the background.
    ///
    /// A failed startup refresh is returned and no timer is started.
    pub async fn start(self: &Arc<Self>, every: Duration) -> ExchangeResult<JoinHandle<()>> {
        self.refresh().await?;
        let cache = Arc::clone(self);
        Ok(spawn_periodic(
            format!("{} cache", self.name()),
            every,
            move || {
                let cache = Arc::clone(&cache);
                async move { cache.refresh().await.map(|_| ()) }
            },
        ))
    }
}
