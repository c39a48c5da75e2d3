//! Binance open-interest cache.
//!
//! Binance has no bulk open-interest endpoint, so every listed futures symbol
//! is queried one by one.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;

use super::cache::{PollSource, PollingCache};
use crate::error::ExchangeResult;
use crate::exchange::binance::types::{OpenInterest, TickerPrice};
use crate::exchange::rest::RestClient;
use crate::exchange::Venue;
use crate::utils::decimal::to_f64;

pub type BinanceOpenInterestCache = PollingCache<BinanceOpenInterestSource>;

#[derive(Debug, Clone)]
pub struct BinanceOpenInterestSource {
    futures: RestClient,
}

impl BinanceOpenInterestSource {
    pub fn new(futures_url: &str, timeout: Duration) -> ExchangeResult<Self> {
        Ok(Self {
            futures: RestClient::new(Venue::Binance, futures_url, timeout)?,
        })
    }
}

#[async_trait]
impl PollSource for BinanceOpenInterestSource {
    /// Open interest in coins.
    type Record = Decimal;

    fn name(&self) -> &'static str {
        "binance_open_interest"
    }

    async fn list_symbols(&self) -> ExchangeResult<Vec<String>> {
        let tickers: Vec<TickerPrice> = self.futures.get_json("/fapi/v2/ticker/price", &[]).await?;
        Ok(tickers.into_iter().map(|t| t.symbol).collect())
    }

    async fn fetch_detail(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let oi: OpenInterest = self
            .futures
            .get_json("/fapi/v1/openInterest", &[("symbol", symbol)])
            .await?;
        Ok(oi.open_interest)
    }
}

impl BinanceOpenInterestCache {
    /// Symbol to open-interest quantity, as served on `/binance/openInterest`.
    pub fn open_interest(&self) -> BTreeMap<String, f64> {
        self.values()
            .into_iter()
            .filter_map(|(symbol, oi)| to_f64(oi).map(|oi| (symbol, oi)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_refresh_open_interest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/ticker/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "price": "50000", "time": 1},
                {"symbol": "ETHUSDT", "price": "3000", "time": 1}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openInterest"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbol": "BTCUSDT", "openInterest": "81234.567", "time": 1700000000000i64
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openInterest"))
            .and(query_param("symbol", "ETHUSDT"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = BinanceOpenInterestSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let cache = PollingCache::new(source, Duration::ZERO);
        let report = cache.refresh().await.unwrap();

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failed, vec!["ETHUSDT".to_string()]);
        let oi = cache.open_interest();
        assert_eq!(oi.len(), 1);
        assert!((oi["BTCUSDT"] - 81234.567).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/ticker/price"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = BinanceOpenInterestSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let cache = PollingCache::new(source, Duration::ZERO);
        assert!(cache.refresh().await.is_err());
        assert!(cache.open_interest().is_empty());
    }
}
