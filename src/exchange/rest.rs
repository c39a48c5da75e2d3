//! Thin REST helper shared by adapters and backend caches.
//!
//! Several venues wrap every payload in a status envelope and report failures
//! inside an HTTP 200 body. [`ApiEnvelope`] unwraps those into either the data
//! or an [`ExchangeError::Protocol`].

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Venue;

/// Status envelope around a venue payload.
pub trait ApiEnvelope: DeserializeOwned {
    type Data;

    fn into_data(self, venue: Venue) -> ExchangeResult<Self::Data>;
}

/// Bitget: `{"code":"00000","msg":"success","data":...}`
#[derive(Debug, Deserialize)]
pub struct BitgetEnvelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T: DeserializeOwned> ApiEnvelope for BitgetEnvelope<T> {
    type Data = T;

    fn into_data(self, venue: Venue) -> ExchangeResult<T> {
        if self.code != "00000" {
            return Err(ExchangeError::Protocol {
                venue,
                code: self.code,
                msg: self.msg,
            });
        }
        self.data.ok_or_else(|| ExchangeError::Protocol {
            venue,
            code: self.code,
            msg: "missing data".to_string(),
        })
    }
}

/// OKX: `{"code":"0","msg":"","data":[...]}`
#[derive(Debug, Deserialize)]
pub struct OkxEnvelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T: DeserializeOwned> ApiEnvelope for OkxEnvelope<T> {
    type Data = T;

    fn into_data(self, venue: Venue) -> ExchangeResult<T> {
        if self.code != "0" {
            return Err(ExchangeError::Protocol {
                venue,
                code: self.code,
                msg: self.msg,
            });
        }
        self.data.ok_or_else(|| ExchangeError::Protocol {
            venue,
            code: self.code,
            msg: "missing data".to_string(),
        })
    }
}

/// Bybit v5: `{"retCode":0,"retMsg":"OK","result":{...}}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitEnvelope<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T: DeserializeOwned> ApiEnvelope for BybitEnvelope<T> {
    type Data = T;

    fn into_data(self, venue: Venue) -> ExchangeResult<T> {
        if self.ret_code != 0 {
            return Err(ExchangeError::Protocol {
                venue,
                code: self.ret_code.to_string(),
                msg: self.ret_msg,
            });
        }
        self.result.ok_or_else(|| ExchangeError::Protocol {
            venue,
            code: "0".to_string(),
            msg: "missing result".to_string(),
        })
    }
}

/// REST client bound to one base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    venue: Venue,
    base_url: String,
}

impl RestClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(venue: Venue, base_url: &str, timeout: Duration) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ExchangeError::Client)?;

        Ok(Self {
            http,
            venue,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` with `query` and decode the JSON body.
    #[instrument(skip(self, query), fields(venue = %self.venue))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ExchangeResult<T> {
        let url = self.url(path);
        let request = self.http.get(&url).query(query);
        self.execute(url, request).await
    }

    /// GET `path` and unwrap the venue's status envelope.
    pub async fn get_enveloped<E: ApiEnvelope>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ExchangeResult<E::Data> {
        let envelope: E = self.get_json(path, query).await?;
        envelope.into_data(self.venue)
    }

    /// POST a JSON body to `path` and decode the JSON response.
    #[instrument(skip(self, body), fields(venue = %self.venue))]
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ExchangeResult<T> {
        let url = self.url(path);
        let request = self.http.post(&url).json(body);
        self.execute(url, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> ExchangeResult<T> {
        let response = request.send().await.map_err(|source| ExchangeError::Http {
            venue: self.venue,
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ExchangeError::Http {
            venue: self.venue,
            url: url.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(ExchangeError::Status {
                venue: self.venue,
                url,
                status: status.as_u16(),
                body: truncate(&body, 256),
            });
        }

        debug!(%url, bytes = body.len(), "REST response");
        serde_json::from_str(&body).map_err(|source| ExchangeError::Decode {
            venue: self.venue,
            url,
            source,
        })
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, venue: Venue) -> RestClient {
        RestClient::new(venue, &server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_bitget_envelope_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/tickers"))
            .and(query_param("productType", "USDT-FUTURES"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "00000",
                "msg": "success",
                "data": [1, 2, 3]
            })))
            .mount(&server)
            .await;

        let data: Vec<u32> = client(&server, Venue::Bitget)
            .get_enveloped::<BitgetEnvelope<Vec<u32>>>(
                "/api/v2/mix/market/tickers",
                &[("productType", "USDT-FUTURES")],
            )
            .await
            .unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_status_field_failure_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/public/instruments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "51001",
                "msg": "Instrument ID does not exist",
                "data": []
            })))
            .mount(&server)
            .await;

        let err = client(&server, Venue::Okx)
            .get_enveloped::<OkxEnvelope<Vec<serde_json::Value>>>("/api/v5/public/instruments", &[])
            .await
            .unwrap_err();
        match err {
            ExchangeError::Protocol { venue, code, msg } => {
                assert_eq!(venue, Venue::Okx);
                assert_eq!(code, "51001");
                assert_eq!(msg, "Instrument ID does not exist");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bybit_envelope_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/instruments-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 10001,
                "retMsg": "params error",
                "result": {}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Venue::Bybit)
            .get_enveloped::<BybitEnvelope<serde_json::Value>>("/v5/market/instruments-info", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Protocol { ref code, .. } if code == "10001"));
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openInterest"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
            )
            .mount(&server)
            .await;

        let err = client(&server, Venue::Binance)
            .get_json::<serde_json::Value>("/fapi/v1/openInterest", &[("symbol", "NOPE")])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server, Venue::Aster)
            .get_json::<serde_json::Value>("/ping", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_post_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_json(serde_json::json!({"type": "metaAndAssetCtxs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let value: serde_json::Value = client(&server, Venue::Hyperliquid)
            .post_json("/info", &serde_json::json!({"type": "metaAndAssetCtxs"}))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }
}
