//! Aster funding-history cache.
//!
//! Aster does not publish settlement periods, so they are inferred from the
//! spacing of the most recent funding events.

use async_trait::async_trait;
use std::time::Duration;

use super::cache::{PollSource, PollingCache};
use crate::error::ExchangeResult;
use crate::exchange::aster::types::{ExchangeInfo, FundingRateInterval, FundingRateSample, SymbolInfo};
use crate::exchange::rest::RestClient;
use crate::exchange::Venue;

pub type AsterFundingCache = PollingCache<AsterFundingSource>;

#[derive(Debug, Clone)]
pub struct AsterFundingSource {
    rest: RestClient,
    limit: String,
}

impl AsterFundingSource {
    pub fn new(rest_url: &str, history_limit: u32, timeout: Duration) -> ExchangeResult<Self> {
        Ok(Self {
            rest: RestClient::new(Venue::Aster, rest_url, timeout)?,
            limit: history_limit.to_string(),
        })
    }
}

#[async_trait]
impl PollSource for AsterFundingSource {
    type Record = Vec<FundingRateSample>;

    fn name(&self) -> &'static str {
        "aster_funding"
    }

    async fn list_symbols(&self) -> ExchangeResult<Vec<String>> {
        let info: ExchangeInfo = self.rest.get_json("/fapi/v1/exchangeInfo", &[]).await?;
        Ok(info
            .symbols
            .into_iter()
            .filter(SymbolInfo::is_trading)
            .map(|s| s.symbol)
            .collect())
    }

    async fn fetch_detail(&self, symbol: &str) -> ExchangeResult<Vec<FundingRateSample>> {
        self.rest
            .get_json(
                "/fapi/v1/fundingRate",
                &[("symbol", symbol), ("limit", self.limit.as_str())],
            )
            .await
    }
}

/// Gap between the two newest samples, in milliseconds.
pub fn derive_interval(samples: &[FundingRateSample]) -> Option<i64> {
    let mut times: Vec<i64> = samples.iter().map(|s| s.funding_time).collect();
    times.sort_unstable_by(|a, b| b.cmp(a));
    match times.as_slice() {
        [newest, previous, ..] => Some(newest - previous),
        _ => None,
    }
}

impl AsterFundingCache {
    /// Every cached sample, grouped by symbol.
    pub fn funding_history(&self) -> Vec<FundingRateSample> {
        self.values().into_values().flatten().collect()
    }

    /// Derived settlement period per symbol. Symbols with fewer than two
    /// samples are omitted.
    pub fn funding_intervals(&self) -> Vec<FundingRateInterval> {
        self.values()
            .into_iter()
            .filter_map(|(symbol, samples)| {
                derive_interval(&samples).map(|funding_interval| FundingRateInterval {
                    symbol,
                    funding_interval,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOUR: i64 = 3_600_000;

    fn sample(time: i64) -> FundingRateSample {
        FundingRateSample {
            symbol: "BTCUSDT".to_string(),
            funding_rate: dec!(0.0001),
            funding_time: time,
        }
    }

    #[test]
    fn test_derive_interval_sorts_descending() {
        let samples = vec![sample(8 * HOUR), sample(16 * HOUR), sample(12 * HOUR)];
        assert_eq!(derive_interval(&samples), Some(4 * HOUR));
        assert_eq!(derive_interval(&[sample(HOUR)]), None);
        assert_eq!(derive_interval(&[]), None);
    }

    #[tokio::test]
    async fn test_refresh_and_views() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbols": [
                    {"symbol": "BTCUSDT", "status": "TRADING"},
                    {"symbol": "NEWUSDT", "status": "TRADING"},
                    {"symbol": "OLDUSDT", "status": "SETTLING"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/fundingRate"))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "fundingRate": "0.00010000", "fundingTime": 8 * HOUR},
                {"symbol": "BTCUSDT", "fundingRate": "0.00012000", "fundingTime": 16 * HOUR}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/fundingRate"))
            .and(query_param("symbol", "NEWUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "NEWUSDT", "fundingRate": "0.00005000", "fundingTime": 16 * HOUR}
            ])))
            .mount(&server)
            .await;

        let source = AsterFundingSource::new(&server.uri(), 10, Duration::from_secs(5)).unwrap();
        let cache = PollingCache::new(source, Duration::ZERO);
        let report = cache.refresh().await.unwrap();
        assert_eq!(report.listed, 2);

        assert_eq!(cache.funding_history().len(), 3);
        assert_eq!(
            cache.funding_intervals(),
            vec![FundingRateInterval {
                symbol: "BTCUSDT".to_string(),
                funding_interval: 8 * HOUR,
            }]
        );
    }
}
