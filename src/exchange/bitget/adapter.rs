//! Bitget USDT-M adapter.
//!
//! Baseline: futures tickers (the tracked contract set), spot symbols and
//! margin currencies (listing predicates) and current funding records from
//! the backend cache. Live: the `ticker` channel for every tracked contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use super::state::{BitgetMetadata, BitgetState};
use super::types::{CurrentFundRate, MarginCurrency, SpotSymbol, Ticker, WsArg, PRODUCT_TYPE};
use crate::config::{AdapterConfig, BitgetEndpoints};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::rest::{BitgetEnvelope, RestClient};
use crate::exchange::shared::{initialize, notify, teardown, AdapterCell, CellHandler, Lifecycle};
use crate::exchange::stream::{Keepalive, StreamConnection};
use crate::exchange::{AdapterEvent, AdapterStatus, ExchangeAdapter, NormalizedQuote, Venue};
use crate::utils::schedule::spawn_periodic;

const VENUE: Venue = Venue::Bitget;
const SUBSCRIBE_BATCH: usize = 50;
const PING_EVERY: Duration = Duration::from_secs(25);

#[derive(Debug, Clone)]
struct MetadataSource {
    rest: RestClient,
    backend: RestClient,
}

impl MetadataSource {
    #[instrument(skip(self), name = "bitget_tickers")]
    async fn tickers(&self) -> ExchangeResult<Vec<Ticker>> {
        self.rest
            .get_enveloped::<BitgetEnvelope<Vec<Ticker>>>(
                "/api/v2/mix/market/tickers",
                &[("productType", PRODUCT_TYPE)],
            )
            .await
    }

    #[instrument(skip(self), name = "bitget_metadata")]
    async fn fetch(&self) -> ExchangeResult<BitgetMetadata> {
        let (fund_rates, spot, margin) = tokio::try_join!(
            self.backend
                .get_json::<HashMap<String, CurrentFundRate>>("/current-fund-rate", &[]),
            self.rest
                .get_enveloped::<BitgetEnvelope<Vec<SpotSymbol>>>("/api/v2/spot/public/symbols", &[]),
            self.rest
                .get_enveloped::<BitgetEnvelope<Vec<MarginCurrency>>>("/api/v2/margin/currencies", &[]),
        )?;

        info!(
            fund_rates = fund_rates.len(),
            spot = spot.len(),
            margin = margin.len(),
            "Fetched Bitget metadata"
        );

        Ok(BitgetMetadata {
            fund_rates,
            spot,
            margin,
        })
    }
}

pub struct BitgetAdapter {
    stream_url: String,
    source: MetadataSource,
    refresh_every: Duration,
    confirm_within: Duration,
    cell: Arc<AdapterCell<BitgetState>>,
    lifecycle: Lifecycle,
}

impl BitgetAdapter {
    pub fn new(endpoints: &BitgetEndpoints, settings: &AdapterConfig) -> ExchangeResult<Self> {
        let timeout = settings.request_timeout();
        Ok(Self {
            stream_url: endpoints.ws.clone(),
            source: MetadataSource {
                rest: RestClient::new(VENUE, &endpoints.rest, timeout)?,
                backend: RestClient::new(VENUE, &settings.backend_url, timeout)?,
            },
            refresh_every: settings.metadata_refresh(),
            confirm_within: settings.stream_confirm(),
            cell: Arc::new(AdapterCell::new()),
            lifecycle: Lifecycle::new(VENUE),
        })
    }

    async fn connect(&self) -> ExchangeResult<()> {
        let (tickers, metadata) = tokio::try_join!(self.source.tickers(), self.source.fetch())?;
        let symbols = self
            .cell
            .write(|state| {
                state.apply_tickers(tickers);
                state.apply_metadata(metadata);
                state.tracked_symbols()
            })
            .unwrap_or_default();

        let handler = CellHandler::new(VENUE, self.cell.clone(), self.lifecycle.events());
        let keepalive = Keepalive::new(PING_EVERY, "ping");
        let conn = StreamConnection::open(VENUE, &self.stream_url, Some(keepalive), handler).await?;
        let first_frame = conn.first_frame();
        self.lifecycle.attach_stream(conn).await;

        let args: Vec<WsArg> = symbols.iter().map(|s| WsArg::ticker(s)).collect();
        let frames = self.lifecycle.subscribe_in_batches(&args, SUBSCRIBE_BATCH).await?;
        info!(symbols = args.len(), frames, "Subscribed to Bitget tickers");
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
impl ExchangeAdapter for BitgetAdapter {
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
