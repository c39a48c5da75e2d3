//! Hyperliquid adapter.
//!
//! Hyperliquid has no push stream for asset contexts, so the adapter polls
//! `metaAndAssetCtxs` and treats each response as a full snapshot. The
//! `Streaming` phase here means "polling".

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use super::client::HyperliquidClient;
use super::state::HyperliquidState;
use crate::config::{AdapterConfig, HyperliquidEndpoints};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::shared::{initialize, notify, teardown, AdapterCell, Lifecycle};
use crate::exchange::{AdapterEvent, AdapterStatus, ExchangeAdapter, NormalizedQuote, Venue};
use crate::utils::schedule::spawn_periodic;

const VENUE: Venue = Venue::Hyperliquid;

pub struct HyperliquidAdapter {
    client: HyperliquidClient,
    poll_every: Duration,
    refresh_every: Duration,
    cell: Arc<AdapterCell<HyperliquidState>>,
    lifecycle: Lifecycle,
}

impl HyperliquidAdapter {
    pub fn new(endpoints: &HyperliquidEndpoints, settings: &AdapterConfig) -> ExchangeResult<Self> {
        Ok(Self {
            client: HyperliquidClient::new(&endpoints.rest, settings.request_timeout())?,
            poll_every: settings.hyperliquid_poll(),
            refresh_every: settings.metadata_refresh(),
            cell: Arc::new(AdapterCell::new()),
            lifecycle: Lifecycle::new(VENUE),
        })
    }

    async fn connect(&self) -> ExchangeResult<()> {
        let (assets, spot_meta) =
            tokio::try_join!(self.client.get_assets(), self.client.get_spot_meta())?;
        info!(assets = assets.len(), spot_pairs = spot_meta.universe.len(), "Fetched Hyperliquid baseline");
        self.cell.write(|state| {
            state.apply_assets(assets);
            state.apply_spot_meta(&spot_meta);
        });

        let client = self.client.clone();
        let cell = self.cell.clone();
        let events = self.lifecycle.events();
        self.lifecycle.add_timer(spawn_periodic(
            format!("{} poll", VENUE),
            self.poll_every,
            move || {
                let client = client.clone();
                let cell = cell.clone();
                let events = events.clone();
                async move {
                    let assets = client.get_assets().await?;
                    if cell.write(|state| state.apply_assets(assets)).is_some() {
                        notify(&events, AdapterEvent::Refreshed { venue: VENUE });
                    }
                    Ok::<_, ExchangeError>(())
                }
            },
        ));

        let client = self.client.clone();
        let cell = self.cell.clone();
        let events = self.lifecycle.events();
        self.lifecycle.add_timer(spawn_periodic(
            format!("{} spot metadata", VENUE),
            self.refresh_every,
            move || {
                let client = client.clone();
                let cell = cell.clone();
                let events = events.clone();
                async move {
                    let meta = client.get_spot_meta().await?;
                    if cell.write(|state| state.apply_spot_meta(&meta)).is_some() {
                        notify(&events, AdapterEvent::Refreshed { venue: VENUE });
                    }
                    Ok::<_, ExchangeError>(())
                }
            },
        ));

        Ok(())
    }
}

#[async_trait]
impl ExchangeAdapter for HyperliquidAdapter {
    fn venue(&self) -> Venue {
        VENUE
    }

    async fn init(&self) -> ExchangeResult<()> {
        initialize(VENUE, &self.cell, &self.lifecycle, self.connect()).await
    }

    async fn destroy(&self) {
        teardown(VENUE, &self.cell, &self.lifecycle).await;
    }

    fn status(&self) -> AdapterStatus {
        self.cell.status()
    }

    fn table_data(&self) -> Vec<NormalizedQuote> {
        self.cell.read_rows(|state| state.table_data())
    }

    fn is_spot_available(&self, symbol: &str) -> bool {
        self.cell.read(|state| state.is_spot_available(symbol))
    }

    /// Spot margin is not offered.
    fn is_margin_available(&self, _symbol: &str) -> bool {
        false
    }

    fn updates(&self) -> broadcast::Receiver<AdapterEvent> {
        self.lifecycle.subscribe()
    }
}
