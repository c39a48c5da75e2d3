//! Aster adapter.
//!
//! Baseline: `exchangeInfo` (trading symbols) and funding periods derived by
//! the backend cache. Live: the `!markPrice@arr@1s` stream, opened directly by
//! URL without a subscribe request.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::state::{AsterMetadata, AsterState};
use super::types::{ExchangeInfo, FundingRateInterval};
use crate::config::{AdapterConfig, AsterEndpoints};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::rest::RestClient;
use crate::exchange::shared::{initialize, notify, teardown, AdapterCell, CellHandler, Lifecycle};
use crate::exchange::stream::StreamConnection;
use crate::exchange::{AdapterEvent, AdapterStatus, ExchangeAdapter, NormalizedQuote, Venue};
use crate::utils::schedule::spawn_periodic;

const VENUE: Venue = Venue::Aster;
const MARK_PRICE_STREAM: &str = "/ws/!markPrice@arr@1s";

#[derive(Debug, Clone)]
struct MetadataSource {
    rest: RestClient,
    backend: RestClient,
}

impl MetadataSource {
    #[instrument(skip(self), name = "aster_metadata")]
    async fn fetch(&self) -> ExchangeResult<AsterMetadata> {
        let info: ExchangeInfo = self.rest.get_json("/fapi/v1/exchangeInfo", &[]).await?;

        let intervals = match self
            .backend
            .get_json::<Vec<FundingRateInterval>>("/aster/fundingRateInterval", &[])
            .await
        {
            Ok(intervals) => Some(intervals),
            Err(e) => {
                warn!(error = %e, "Aster funding intervals unavailable, assuming 8h");
                None
            }
        };

        info!(
            symbols = info.symbols.len(),
            intervals = intervals.as_ref().map(Vec::len),
            "Fetched Aster metadata"
        );

        Ok(AsterMetadata {
            symbols: info.symbols,
            intervals,
        })
    }
}

pub struct AsterAdapter {
    stream_url: String,
    source: MetadataSource,
    refresh_every: Duration,
    confirm_within: Duration,
    cell: Arc<AdapterCell<AsterState>>,
    lifecycle: Lifecycle,
}

impl AsterAdapter {
    pub fn new(endpoints: &AsterEndpoints, settings: &AdapterConfig) -> ExchangeResult<Self> {
        let timeout = settings.request_timeout();
        Ok(Self {
            stream_url: format!("{}{}", endpoints.ws.trim_end_matches('/'), MARK_PRICE_STREAM),
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
        let metadata = self.source.fetch().await?;
        self.cell.write(|state| state.apply_metadata(metadata));

        let handler = CellHandler::new(VENUE, self.cell.clone(), self.lifecycle.events());
        let conn = StreamConnection::open(VENUE, &self.stream_url, None, handler).await?;
        let first_frame = conn.first_frame();
        self.lifecycle.attach_stream(conn).await;
        // The stream is selected by URL, so the first mark array confirms it
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
impl ExchangeAdapter for AsterAdapter {
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

    /// Aster lists perpetuals only.
    fn is_spot_available(&self, _symbol: &str) -> bool {
        false
    }

    fn is_margin_available(&self, _symbol: &str) -> bool {
        false
    }

    fn updates(&self) -> broadcast::Receiver<AdapterEvent> {
        self.lifecycle.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::stream::test_server;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_rest(rest: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/fapi/v1/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbols": [{"symbol": "BTCUSDT", "status": "TRADING"}]
            })))
            .mount(rest)
            .await;
        Mock::given(method("GET"))
            .and(path("/aster/fundingRateInterval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "fundingInterval": 3_600_000}
            ])))
            .mount(rest)
            .await;
    }

    fn adapter(rest: &MockServer, ws_url: &str) -> AsterAdapter {
        let endpoints = AsterEndpoints {
            rest: rest.uri(),
            ws: ws_url.to_string(),
        };
        let settings = AdapterConfig {
            backend_url: rest.uri(),
            ..AdapterConfig::default()
        };
        AsterAdapter::new(&endpoints, &settings).unwrap()
    }

    #[tokio::test]
    async fn test_init_and_stream() {
        let rest = MockServer::start().await;
        mount_rest(&rest).await;

        // The stream path is appended to the configured host
        let ws = test_server::spawn().await;
        let adapter = adapter(&rest, &ws.url);
        assert!(adapter.stream_url.ends_with("/ws/!markPrice@arr@1s"));
        let mut updates = adapter.updates();

        ws.push
            .send(r#"[{"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"100","i":"100","P":"100","r":"0.0001","T":2}]"#.to_string())
            .unwrap();
        adapter.init().await.unwrap();
        assert!(matches!(updates.recv().await.unwrap(), AdapterEvent::Updated { .. }));

        let rows = adapter.table_data();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].funding_rate_apr - 87.6).abs() < 1e-9);
        assert!(!adapter.is_spot_available("BTC"));

        adapter.destroy().await;
    }

    #[tokio::test]
    async fn test_stream_closed_during_startup_fails_init() {
        let rest = MockServer::start().await;
        mount_rest(&rest).await;
        let ws = test_server::spawn().await;
        let adapter = adapter(&rest, &ws.url);

        drop(ws.push);
        match adapter.init().await.unwrap_err() {
            ExchangeError::Init { source, .. } => {
                assert!(matches!(*source, ExchangeError::Stream { .. }), "source {:?}", source)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(adapter.status(), AdapterStatus::Uninitialized);
        assert!(adapter.table_data().is_empty());
    }
}
