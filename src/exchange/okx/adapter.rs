//! OKX perpetual swap adapter.
//!
//! Baseline: swap instruments, mark prices, USDT index tickers and open
//! interest, plus spot and margin instrument lists for the predicates.
//! Live: `instruments`, `funding-rate`, `mark-price`, `index-tickers` and
//! `open-interest` channels.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::state::{index_id, OkxBaseline, OkxMetadata, OkxState};
use super::types::{IndexTicker, Instrument, MarkPrice, OpenInterest, WsArg};
use crate::config::{AdapterConfig, OkxEndpoints};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::rest::{OkxEnvelope, RestClient};
use crate::exchange::shared::{initialize, notify, teardown, AdapterCell, CellHandler, Lifecycle};
use crate::exchange::stream::{Keepalive, StreamConnection};
use crate::exchange::{AdapterEvent, AdapterStatus, ExchangeAdapter, NormalizedQuote, Venue};
use crate::utils::normalize::QUOTE_ASSET;
use crate::utils::schedule::spawn_periodic;

const VENUE: Venue = Venue::Okx;
const SUBSCRIBE_BATCH: usize = 100;
const PING_EVERY: Duration = Duration::from_secs(25);

#[derive(Debug, Clone)]
struct MetadataSource {
    rest: RestClient,
}

impl MetadataSource {
    async fn instruments(&self, inst_type: &str) -> ExchangeResult<Vec<Instrument>> {
        self.rest
            .get_enveloped::<OkxEnvelope<Vec<Instrument>>>(
                "/api/v5/public/instruments",
                &[("instType", inst_type)],
            )
            .await
    }

    #[instrument(skip(self), name = "okx_baseline")]
    async fn baseline(&self) -> ExchangeResult<OkxBaseline> {
        let (swaps, marks, index) = tokio::try_join!(
            self.instruments("SWAP"),
            self.rest.get_enveloped::<OkxEnvelope<Vec<MarkPrice>>>(
                "/api/v5/public/mark-price",
                &[("instType", "SWAP")],
            ),
            self.rest.get_enveloped::<OkxEnvelope<Vec<IndexTicker>>>(
                "/api/v5/market/index-tickers",
                &[("quoteCcy", QUOTE_ASSET)],
            ),
        )?;

        // The open-interest channel fills this in as well
        let open_interest = self
            .rest
            .get_enveloped::<OkxEnvelope<Vec<OpenInterest>>>(
                "/api/v5/public/open-interest",
                &[("instType", "SWAP")],
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "OKX open interest snapshot unavailable");
                Vec::new()
            });

        info!(
            swaps = swaps.len(),
            marks = marks.len(),
            index = index.len(),
            open_interest = open_interest.len(),
            "Fetched OKX baseline"
        );

        Ok(OkxBaseline {
            swaps,
            marks,
            index,
            open_interest,
        })
    }

    #[instrument(skip(self), name = "okx_metadata")]
    async fn fetch(&self) -> ExchangeResult<OkxMetadata> {
        let (spot, margin) = tokio::try_join!(self.instruments("SPOT"), self.instruments("MARGIN"))?;
        Ok(OkxMetadata { spot, margin })
    }
}

/// Subscription arguments for the tracked swaps.
fn subscription_args(inst_ids: &[String]) -> Vec<WsArg> {
    let mut args = vec![WsArg::inst_type("instruments", "SWAP")];
    for id in inst_ids {
        args.push(WsArg::inst_id("funding-rate", id));
        args.push(WsArg::inst_id("mark-price", id));
        args.push(WsArg::inst_id("open-interest", id));
        args.push(WsArg::inst_id("index-tickers", index_id(id)));
    }
    args
}

pub struct OkxAdapter {
    stream_url: String,
    source: MetadataSource,
    refresh_every: Duration,
    confirm_within: Duration,
    cell: Arc<AdapterCell<OkxState>>,
    lifecycle: Lifecycle,
}

impl OkxAdapter {
    pub fn new(endpoints: &OkxEndpoints, settings: &AdapterConfig) -> ExchangeResult<Self> {
        Ok(Self {
            stream_url: endpoints.ws.clone(),
            source: MetadataSource {
                rest: RestClient::new(VENUE, &endpoints.rest, settings.request_timeout())?,
            },
            refresh_every: settings.metadata_refresh(),
            confirm_within: settings.stream_confirm(),
            cell: Arc::new(AdapterCell::new()),
            lifecycle: Lifecycle::new(VENUE),
        })
    }

    async fn connect(&self) -> ExchangeResult<()> {
        let (baseline, metadata) = tokio::try_join!(self.source.baseline(), self.source.fetch())?;
        let inst_ids = self
            .cell
            .write(|state| {
                state.apply_baseline(baseline);
                state.apply_metadata(metadata);
                state.tracked_inst_ids()
            })
            .unwrap_or_default();

        let handler = CellHandler::new(VENUE, self.cell.clone(), self.lifecycle.events());
        let keepalive = Keepalive::new(PING_EVERY, "ping");
        let conn = StreamConnection::open(VENUE, &self.stream_url, Some(keepalive), handler).await?;
        let first_frame = conn.first_frame();
        self.lifecycle.attach_stream(conn).await;

        let args = subscription_args(&inst_ids);
        let frames = self.lifecycle.subscribe_in_batches(&args, SUBSCRIBE_BATCH).await?;
        info!(swaps = inst_ids.len(), args = args.len(), frames, "Subscribed to OKX channels");
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
impl ExchangeAdapter for OkxAdapter {
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
