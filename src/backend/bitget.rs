//! Bitget current-fund-rate cache.
//!
//! The per-symbol `current-fund-rate` endpoint is the only place Bitget
//! reports each contract's settlement period, and it is rate limited.

use async_trait::async_trait;
use std::time::Duration;

use super::cache::{PollSource, PollingCache};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::bitget::types::{CurrentFundRate, Ticker, PRODUCT_TYPE};
use crate::exchange::rest::{BitgetEnvelope, RestClient};
use crate::exchange::Venue;

pub type BitgetFundRateCache = PollingCache<BitgetFundRateSource>;

#[derive(Debug, Clone)]
pub struct BitgetFundRateSource {
    rest: RestClient,
}

impl BitgetFundRateSource {
    pub fn new(rest_url: &str, timeout: Duration) -> ExchangeResult<Self> {
        Ok(Self {
            rest: RestClient::new(Venue::Bitget, rest_url, timeout)?,
        })
    }
}

#[async_trait]
impl PollSource for BitgetFundRateSource {
    type Record = CurrentFundRate;

    fn name(&self) -> &'static str {
        "bitget_fund_rate"
    }

    async fn list_symbols(&self) -> ExchangeResult<Vec<String>> {
        let tickers = self
            .rest
            .get_enveloped::<BitgetEnvelope<Vec<Ticker>>>(
                "/api/v2/mix/market/tickers",
                &[("productType", PRODUCT_TYPE)],
            )
            .await?;
        Ok(tickers
            .into_iter()
            .filter(Ticker::is_trading)
            .map(|t| t.symbol)
            .collect())
    }

    async fn fetch_detail(&self, symbol: &str) -> ExchangeResult<CurrentFundRate> {
        let records = self
            .rest
            .get_enveloped::<BitgetEnvelope<Vec<CurrentFundRate>>>(
                "/api/v2/mix/market/current-fund-rate",
                &[("symbol", symbol), ("productType", PRODUCT_TYPE)],
            )
            .await?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::data_gap(Venue::Bitget, symbol, "current fund rate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_tickers(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/tickers"))
            .and(query_param("productType", "USDT-FUTURES"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "00000",
                "msg": "success",
                "data": [
                    {"symbol": "BTCUSDT", "lastPr": "50000"},
                    {"symbol": "ETHUSDT", "lastPr": "3000"},
                    {"symbol": "NEWUSDT", "lastPr": "0"}
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_refresh_with_one_failing_symbol() {
        let server = MockServer::start().await;
        mount_tickers(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/current-fund-rate"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "00000",
                "data": [{
                    "symbol": "BTCUSDT",
                    "fundingRate": "0.0001",
                    "fundingRateInterval": "8",
                    "nextUpdate": "1700000000000",
                    "minFundingRate": "-0.003",
                    "maxFundingRate": "0.003"
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/current-fund-rate"))
            .and(query_param("symbol", "ETHUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "40034",
                "msg": "Parameter does not exist"
            })))
            .mount(&server)
            .await;

        let source = BitgetFundRateSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let cache = PollingCache::new(source, Duration::ZERO);
        let report = cache.refresh().await.unwrap();

        // Contracts with no last trade are not listed
        assert_eq!(report.listed, 2);
        assert_eq!(report.failed, vec!["ETHUSDT".to_string()]);

        let btc = cache.get("BTCUSDT").unwrap().value;
        assert_eq!(btc.funding_rate_interval, Some(dec!(8)));

        let served = serde_json::to_value(cache.values()).unwrap();
        assert_eq!(served["BTCUSDT"]["fundingRateInterval"], "8");
        assert!(served.get("ETHUSDT").is_none());
    }

    #[tokio::test]
    async fn test_empty_detail_is_a_gap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/current-fund-rate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "00000",
                "data": []
            })))
            .mount(&server)
            .await;

        let source = BitgetFundRateSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = source.fetch_detail("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, ExchangeError::DataGap { .. }));
    }
}
