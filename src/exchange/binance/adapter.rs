//! Binance USDⓈ-M adapter.
//!
//! Baseline: spot `exchangeInfo` (listing predicates), futures `fundingInfo`
//! (per-symbol funding period) and open interest from the backend cache.
//! Live: the all-market `!markPrice@arr` stream, where every entry is a full
//! snapshot of its symbol.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::state::{BinanceMetadata, BinanceState};
use super::types::{FundingInfo, SpotExchangeInfo};
use crate::config::{AdapterConfig, BinanceEndpoints};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::rest::RestClient;
use crate::exchange::shared::{initialize, notify, teardown, AdapterCell, CellHandler, Lifecycle};
use crate::exchange::stream::StreamConnection;
use crate::exchange::{
    AdapterEvent, AdapterStatus, ExchangeAdapter, NormalizedQuote, Venue,
};
use crate::utils::schedule::spawn_periodic;

const VENUE: Venue = Venue::Binance;

/// REST sources for the Binance baseline.
#[derive(Debug, Clone)]
struct MetadataSource {
    spot: RestClient,
    futures: RestClient,
    backend: RestClient,
}

impl MetadataSource {
    #[instrument(skip(self), name = "binance_metadata")]
    async fn fetch(&self) -> ExchangeResult<BinanceMetadata> {
        let spot: SpotExchangeInfo = self.spot.get_json("/api/v3/exchangeInfo", &[]).await?;
        let funding_info: Vec<FundingInfo> = self.futures.get_json("/fapi/v1/fundingInfo", &[]).await?;

        // Open interest only enriches rows; an unreachable backend leaves it unknown
        let open_interest = match self
            .backend
            .get_json::<HashMap<String, f64>>("/binance/openInterest", &[])
            .await
        {
            Ok(oi) => Some(oi),
            Err(e) => {
                warn!(error = %e, "Binance open interest unavailable");
                None
            }
        };

        info!(
            spot = spot.symbols.len(),
            funding_overrides = funding_info.len(),
            "Fetched Binance metadata"
        );

        Ok(BinanceMetadata {
            spot: spot.symbols,
            funding_info,
            open_interest,
        })
    }
}

pub struct BinanceAdapter {
    stream_url: String,
    source: MetadataSource,
    refresh_every: Duration,
    confirm_within: Duration,
    cell: Arc<AdapterCell<BinanceState>>,
    lifecycle: Lifecycle,
}

impl BinanceAdapter {
    pub fn new(endpoints: &BinanceEndpoints, settings: &AdapterConfig) -> ExchangeResult<Self> {
        let timeout = settings.request_timeout();
        Ok(Self {
            stream_url: endpoints.futures_ws.clone(),
            source: MetadataSource {
                spot: RestClient::new(VENUE, &endpoints.spot_rest, timeout)?,
                futures: RestClient::new(VENUE, &endpoints.futures_rest, timeout)?,
                backend: RestClient::new(VENUE, &settings.backend_url, timeout)?,
            },
            refresh_every: settings.metadata_refresh(),
            confirm_within: settings.stream_confirm(),
            cell: Arc::new(AdapterCell::new()),
            lifecycle: Lifecycle::new(VENUE),
        })
    }

    async fn connect(&self) -> ExchangeResult<()> {
        let metadata = self.source.fetch().await?;
        self.cell.write(|state| state.apply_metadata(metadata));

        let handler = CellHandler::new(VENUE, self.cell.clone(), self.lifecycle.events());
        let conn = StreamConnection::open(VENUE, &self.stream_url, None, handler).await?;
        let first_frame = conn.first_frame();
        self.lifecycle.attach_stream(conn).await;
        self.lifecycle
            .send_json(&json!({
                "method": "SUBSCRIBE",
                "params": ["!markPrice@arr"],
                "id": 1,
            }))
            .await?;
        first_frame.wait(self.confirm_within).await?;

        let source = self.source.clone();
        let cell = self.cell.clone();
        let events = self.lifecycle.events();
        self.lifecycle.add_timer(spawn_periodic(
            format!("{} metadata", VENUE),
            self.refresh_every,
            move || {
                let source = source.clone();
                let cell = cell.clone();
                let events = events.clone();
                async move {
                    let metadata = source.fetch().await?;
                    if cell.write(|state| state.apply_metadata(metadata)).is_some() {
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
impl ExchangeAdapter for BinanceAdapter {
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

    fn is_margin_available(&self, symbol: &str) -> bool {
        self.cell.read(|state| state.is_margin_available(symbol))
    }

    fn updates(&self) -> broadcast::Receiver<AdapterEvent> {
        self.lifecycle.subscribe()
    }
}
