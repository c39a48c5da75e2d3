//! Hyperliquid REST API client.
//!
//! Provides read-only access to Hyperliquid market data:
//! - Funding rates (hourly), mark and oracle prices, open interest
//! - Spot token listings

use std::time::Duration;
use tracing::{debug, instrument};

use super::types::*;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::rest::RestClient;
use crate::exchange::Venue;

const INFO_PATH: &str = "/info";

/// Hyperliquid API client for fetching market data.
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    rest: RestClient,
}

impl HyperliquidClient {
    /// Create a client for `base_url` (the `/info` path is appended).
    pub fn new(base_url: &str, timeout: Duration) -> ExchangeResult<Self> {
        Ok(Self {
            rest: RestClient::new(Venue::Hyperliquid, base_url, timeout)?,
        })
    }

    /// Get metadata and asset contexts for all perpetuals.
    /// Returns funding rates, prices, open interest, and volume.
    #[instrument(skip(self), name = "hl_meta_and_asset_ctxs")]
    pub async fn get_meta_and_asset_ctxs(&self) -> ExchangeResult<(Meta, Vec<AssetCtx>)> {
        let data: MetaAndAssetCtxsResponse = self
            .rest
            .post_json(INFO_PATH, &InfoRequest::MetaAndAssetCtxs)
            .await?;

        debug!("Fetched {} assets from Hyperliquid", data.0.universe.len());

        Ok(data)
    }

    /// Get all assets with their current market data.
    /// Combines metadata with asset contexts into a convenient format.
    #[instrument(skip(self), name = "hl_get_assets")]
    pub async fn get_assets(&self) -> ExchangeResult<Vec<HyperliquidAsset>> {
        let (meta, ctxs) = self.get_meta_and_asset_ctxs().await?;

        if meta.universe.len() != ctxs.len() {
            return Err(ExchangeError::Protocol {
                venue: Venue::Hyperliquid,
                code: "metaAndAssetCtxs".to_string(),
                msg: format!(
                    "Mismatch between universe ({}) and contexts ({})",
                    meta.universe.len(),
                    ctxs.len()
                ),
            });
        }

        let assets: Vec<HyperliquidAsset> = meta
            .universe
            .into_iter()
            .zip(ctxs)
            .map(|(m, c)| HyperliquidAsset {
                name: m.name,
                funding_rate: c.funding,
                open_interest: c.open_interest,
                oracle_price: c.oracle_px,
                mark_price: c.mark_px,
                is_delisted: m.is_delisted,
            })
            .collect();

        Ok(assets)
    }

    /// Get spot token and pair metadata.
    #[instrument(skip(self), name = "hl_spot_meta")]
    pub async fn get_spot_meta(&self) -> ExchangeResult<SpotMeta> {
        self.rest.post_json(INFO_PATH, &InfoRequest::SpotMeta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx(funding: &str) -> serde_json::Value {
        json!({"funding": funding, "openInterest": "10", "prevDayPx": "1", "dayNtlVlm": "1",
               "premium": "0", "oraclePx": "100", "markPx": "101", "midPx": "100.5"})
    }

    #[tokio::test]
    async fn test_get_assets_zips_universe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_json(json!({"type": "metaAndAssetCtxs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"universe": [
                    {"name": "BTC", "szDecimals": 5, "maxLeverage": 40},
                    {"name": "OLD", "szDecimals": 0, "maxLeverage": 3, "isDelisted": true}
                ]},
                [ctx("0.0000125"), ctx("0")]
            ])))
            .mount(&server)
            .await;

        let client = HyperliquidClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let assets = client.get_assets().await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].name, "BTC");
        assert!(assets[1].is_delisted);
    }

    #[tokio::test]
    async fn test_length_mismatch_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"universe": [{"name": "BTC", "szDecimals": 5, "maxLeverage": 40}]},
                []
            ])))
            .mount(&server)
            .await;

        let client = HyperliquidClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.get_assets().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Protocol { .. }));
    }
}
