//! Bybit linear adapter.
//!
//! Baseline: linear and spot instrument listings (paged by cursor) and a
//! tickers snapshot. Live: `tickers.{symbol}` topics, a snapshot on subscribe
//! followed by deltas.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::state::{BybitMetadata, BybitState};
use super::types::{InstrumentsPage, LinearInstrument, LinearTicker, SpotInstrument, TickerList};
use crate::config::{AdapterConfig, BybitEndpoints};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::rest::{BybitEnvelope, RestClient};
use crate::exchange::shared::{initialize, notify, teardown, AdapterCell, CellHandler, Lifecycle};
use crate::exchange::stream::{Keepalive, StreamConnection};
use crate::exchange::{AdapterEvent, AdapterStatus, ExchangeAdapter, NormalizedQuote, Venue};
use crate::utils::schedule::spawn_periodic;

const VENUE: Venue = Venue::Bybit;
const SUBSCRIBE_BATCH: usize = 10;
const PING_EVERY: Duration = Duration::from_secs(20);
const PAGE_LIMIT: &str = "1000";
/// Guard against a cursor that never runs out
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
struct MetadataSource {
    rest: RestClient,
}

impl MetadataSource {
    async fn instruments<T: DeserializeOwned>(&self, category: &str) -> ExchangeResult<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor = String::new();

        for page_no in 0..MAX_PAGES {
            let page = {
                let mut query = vec![("category", category), ("limit", PAGE_LIMIT)];
                if !cursor.is_empty() {
                    query.push(("cursor", cursor.as_str()));
                }
                self.rest
                    .get_enveloped::<BybitEnvelope<InstrumentsPage<T>>>("/v5/market/instruments-info", &query)
                    .await?
            };

            debug!(category, page = page_no, items = page.list.len(), "Fetched instruments page");
            items.extend(page.list);
            if page.next_page_cursor.is_empty() {
                return Ok(items);
            }
            cursor = page.next_page_cursor;
        }

        warn!(category, pages = MAX_PAGES, "Instrument cursor did not terminate, truncating");
        Ok(items)
    }

    #[instrument(skip(self), name = "bybit_metadata")]
    async fn fetch(&self) -> ExchangeResult<BybitMetadata> {
        let (linear, spot) = tokio::try_join!(
            self.instruments::<LinearInstrument>("linear"),
            self.instruments::<SpotInstrument>("spot"),
        )?;
        info!(linear = linear.len(), spot = spot.len(), "Fetched Bybit instruments");
        Ok(BybitMetadata { linear, spot })
    }

    #[instrument(skip(self), name = "bybit_tickers")]
    async fn tickers(&self) -> ExchangeResult<Vec<LinearTicker>> {
        let tickers = self
            .rest
            .get_enveloped::<BybitEnvelope<TickerList>>("/v5/market/tickers", &[("category", "linear")])
            .await?;
        Ok(tickers.list)
    }
}

pub struct BybitAdapter {
    stream_url: String,
    source: MetadataSource,
    refresh_every: Duration,
    confirm_within: Duration,
    cell: Arc<AdapterCell<BybitState>>,
    lifecycle: Lifecycle,
}

impl BybitAdapter {
    pub fn new(endpoints: &BybitEndpoints, settings: &AdapterConfig) -> ExchangeResult<Self> {
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
        let (metadata, tickers) = tokio::try_join!(self.source.fetch(), self.source.tickers())?;
        let symbols = self
            .cell
            .write(|state| {
                state.apply_metadata(metadata);
                state.apply_tickers(tickers);
                state.tracked_symbols()
            })
            .unwrap_or_default();

        let handler = CellHandler::new(VENUE, self.cell.clone(), self.lifecycle.events());
        let keepalive = Keepalive::new(PING_EVERY, json!({"op": "ping"}).to_string());
        let conn = StreamConnection::open(VENUE, &self.stream_url, Some(keepalive), handler).await?;
        let first_frame = conn.first_frame();
        self.lifecycle.attach_stream(conn).await;

        let topics: Vec<String> = symbols.iter().map(|s| format!("tickers.{}", s)).collect();
        let frames = self.lifecycle.subscribe_in_batches(&topics, SUBSCRIBE_BATCH).await?;
        info!(symbols = topics.len(), frames, "Subscribed to Bybit tickers");
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
impl ExchangeAdapter for BybitAdapter {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::stream::test_server;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "retCode": 0, "retMsg": "OK", "result": result, "time": 1
        }))
    }

    fn linear(symbol: &str) -> serde_json::Value {
        json!({"symbol": symbol, "contractType": "LinearPerpetual", "status": "Trading",
               "baseCoin": "X", "quoteCoin": "USDT", "fundingInterval": 480})
    }

    async fn mount_rest(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v5/market/instruments-info"))
            .and(query_param("category", "linear"))
            .and(query_param("cursor", "page2"))
            .respond_with(ok(json!({"category": "linear", "list": [linear("ETHUSDT")], "nextPageCursor": ""})))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v5/market/instruments-info"))
            .and(query_param("category", "linear"))
            .respond_with(ok(json!({"category": "linear", "list": [linear("BTCUSDT")], "nextPageCursor": "page2"})))
            .with_priority(2)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v5/market/instruments-info"))
            .and(query_param("category", "spot"))
            .respond_with(ok(json!({"category": "spot", "list": [
                {"symbol": "BTCUSDT", "status": "Trading", "marginTrading": "utaOnly"}
            ], "nextPageCursor": ""})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .respond_with(ok(json!({"category": "linear", "list": [
                {"symbol": "BTCUSDT", "markPrice": "50000", "indexPrice": "50000", "fundingRate": "0.0001"}
            ]})))
            .mount(server)
            .await;
    }

    const ACK: &str = r#"{"success":true,"ret_msg":"","conn_id":"c1","op":"subscribe"}"#;

    fn adapter(rest: &MockServer, ws_url: &str) -> BybitAdapter {
        let endpoints = BybitEndpoints {
            rest: rest.uri(),
            ws: ws_url.to_string(),
        };
        BybitAdapter::new(&endpoints, &AdapterConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_init_follows_cursor_and_subscribes() {
        let rest = MockServer::start().await;
        mount_rest(&rest).await;
        let mut ws = test_server::spawn().await;
        let adapter = adapter(&rest, &ws.url);
        let mut updates = adapter.updates();

        ws.push.send(ACK.to_string()).unwrap();
        adapter.init().await.unwrap();

        let subscribe: serde_json::Value =
            serde_json::from_str(&ws.received.recv().await.unwrap()).unwrap();
        assert_eq!(subscribe["args"], json!(["tickers.BTCUSDT", "tickers.ETHUSDT"]));

        // REST baseline is visible right after init
        let rows = adapter.table_data();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].funding_rate_apr - 10.95).abs() < 1e-9);

        ws.push
            .send(
                r#"{"topic":"tickers.ETHUSDT","type":"snapshot","ts":1,
                    "data":{"symbol":"ETHUSDT","markPrice":"3000","indexPrice":"3000","fundingRate":"0.0002"}}"#
                    .to_string(),
            )
            .unwrap();
        assert_eq!(
            updates.recv().await.unwrap(),
            AdapterEvent::Updated {
                venue: Venue::Bybit,
                symbol: "ETHUSDT".to_string()
            }
        );
        assert_eq!(adapter.table_data().len(), 2);
        assert!(adapter.is_margin_available("BTC"));

        adapter.destroy().await;
        assert!(adapter.table_data().is_empty());
    }

    #[tokio::test]
    async fn test_stream_handshake_failure_fails_init() {
        let rest = MockServer::start().await;
        mount_rest(&rest).await;
        let adapter = adapter(&rest, "ws://127.0.0.1:1");

        let err = adapter.init().await.unwrap_err();
        match err {
            ExchangeError::Init { source, .. } => {
                assert!(matches!(*source, ExchangeError::Stream { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(adapter.status(), AdapterStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_rejected_subscription_fails_init() {
        let rest = MockServer::start().await;
        mount_rest(&rest).await;
        let ws = test_server::spawn().await;
        let adapter = adapter(&rest, &ws.url);

        ws.push
            .send(r#"{"success":false,"ret_msg":"error:handler not found","op":"subscribe"}"#.to_string())
            .unwrap();
        let err = adapter.init().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Init { venue: Venue::Bybit, .. }));
        assert_eq!(adapter.status(), AdapterStatus::Uninitialized);
        assert!(adapter.table_data().is_empty());
    }
}
