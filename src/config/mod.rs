//! Configuration management for the funding rate aggregator.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::exchange::Venue;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Venue REST and WebSocket endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Exchange adapter settings
    #[serde(default)]
    pub adapters: AdapterConfig,
    /// Backend polling caches and HTTP surface
    #[serde(default)]
    pub backend: BackendConfig,
    /// Aggregation cadence
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub binance: BinanceEndpoints,
    #[serde(default)]
    pub bitget: BitgetEndpoints,
    #[serde(default)]
    pub bybit: BybitEndpoints,
    #[serde(default)]
    pub okx: OkxEndpoints,
    #[serde(default)]
    pub hyperliquid: HyperliquidEndpoints,
    #[serde(default)]
    pub aster: AsterEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceEndpoints {
    #[serde(default = "default_binance_spot_rest")]
    pub spot_rest: String,
    #[serde(default = "default_binance_futures_rest")]
    pub futures_rest: String,
    #[serde(default = "default_binance_futures_ws")]
    pub futures_ws: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitgetEndpoints {
    #[serde(default = "default_bitget_rest")]
    pub rest: String,
    #[serde(default = "default_bitget_ws")]
    pub ws: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BybitEndpoints {
    #[serde(default = "default_bybit_rest")]
    pub rest: String,
    #[serde(default = "default_bybit_ws")]
    pub ws: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxEndpoints {
    #[serde(default = "default_okx_rest")]
    pub rest: String,
    #[serde(default = "default_okx_ws")]
    pub ws: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperliquidEndpoints {
    #[serde(default = "default_hyperliquid_rest")]
    pub rest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsterEndpoints {
    #[serde(default = "default_aster_rest")]
    pub rest: String,
    /// Stream host; the stream path is appended.
    #[serde(default = "default_aster_ws")]
    pub ws: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Venues to run in `watch`
    #[serde(default = "default_enabled_venues")]
    pub enabled: Vec<Venue>,
    /// Base URL of the backend polling caches (our own `serve` process)
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Per-request REST timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How often adapters re-fetch backend data and listing metadata
    #[serde(default = "default_metadata_refresh")]
    pub metadata_refresh_secs: u64,
    /// Hyperliquid has no push stream; its snapshot is polled instead
    #[serde(default = "default_hyperliquid_poll")]
    pub hyperliquid_poll_secs: u64,
    /// How long `init()` waits for the first stream frame after subscribing
    #[serde(default = "default_stream_confirm")]
    pub stream_confirm_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Listen address of the HTTP surface
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Full refresh period of every cache
    #[serde(default = "default_cache_refresh")]
    pub refresh_interval_secs: u64,
    /// Delay between per-symbol Bitget requests
    #[serde(default = "default_bitget_pace")]
    pub bitget_pace_ms: u64,
    /// Delay between per-symbol Binance requests
    #[serde(default = "default_binance_pace")]
    pub binance_pace_ms: u64,
    /// Delay between per-symbol Aster requests
    #[serde(default = "default_aster_pace")]
    pub aster_pace_ms: u64,
    /// Samples kept per Aster symbol
    #[serde(default = "default_aster_history_limit")]
    pub aster_history_limit: u32,
    /// Per-request REST timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Milliseconds between aggregation ticks
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

// Default value functions
fn default_binance_spot_rest() -> String {
    "https://api.binance.com".to_string()
}

fn default_binance_futures_rest() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_binance_futures_ws() -> String {
    "wss://fstream.binance.com/ws".to_string()
}

fn default_bitget_rest() -> String {
    "https://api.bitget.com".to_string()
}

fn default_bitget_ws() -> String {
    "wss://ws.bitget.com/v2/ws/public".to_string()
}

fn default_bybit_rest() -> String {
    "https://api.bybit.com".to_string()
}

fn default_bybit_ws() -> String {
    "wss://stream.bybit.com/v5/public/linear".to_string()
}

fn default_okx_rest() -> String {
    "https://www.okx.com".to_string()
}

fn default_okx_ws() -> String {
    "wss://ws.okx.com:8443/ws/v5/public".to_string()
}

fn default_hyperliquid_rest() -> String {
    "https://api.hyperliquid.xyz".to_string()
}

fn default_aster_rest() -> String {
    "https://fapi.asterdex.com".to_string()
}

fn default_aster_ws() -> String {
    "wss://fstream.asterdex.com".to_string()
}

fn default_enabled_venues() -> Vec<Venue> {
    Venue::ALL.to_vec()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_metadata_refresh() -> u64 {
    300 // 5 minutes; backend caches themselves refresh every 10
}

fn default_hyperliquid_poll() -> u64 {
    5
}

fn default_stream_confirm() -> u64 {
    10
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_cache_refresh() -> u64 {
    10 * 60
}

fn default_bitget_pace() -> u64 {
    60
}

fn default_binance_pace() -> u64 {
    30
}

fn default_aster_pace() -> u64 {
    50
}

fn default_aster_history_limit() -> u32 {
    10
}

fn default_tick_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("FRA")
                    .list_separator(",")
                    .with_list_parse_key("adapters.enabled")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.adapters.enabled.is_empty(),
            "adapters.enabled must list at least one venue"
        );

        anyhow::ensure!(
            self.adapters.request_timeout_secs > 0 && self.backend.request_timeout_secs > 0,
            "request timeouts must be positive"
        );

        anyhow::ensure!(
            self.adapters.metadata_refresh_secs > 0 && self.adapters.hyperliquid_poll_secs > 0,
            "adapter refresh intervals must be positive"
        );

        anyhow::ensure!(
            self.adapters.stream_confirm_secs > 0,
            "adapters.stream_confirm_secs must be positive"
        );

        anyhow::ensure!(
            self.backend.refresh_interval_secs > 0,
            "backend.refresh_interval_secs must be positive"
        );

        anyhow::ensure!(
            self.backend.aster_history_limit >= 2,
            "backend.aster_history_limit must be at least 2 to derive a funding interval"
        );

        anyhow::ensure!(self.aggregator.tick_ms > 0, "aggregator.tick_ms must be positive");

        Ok(())
    }
}

impl AdapterConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn metadata_refresh(&self) -> Duration {
        Duration::from_secs(self.metadata_refresh_secs)
    }

    pub fn hyperliquid_poll(&self) -> Duration {
        Duration::from_secs(self.hyperliquid_poll_secs)
    }

    pub fn stream_confirm(&self) -> Duration {
        Duration::from_secs(self.stream_confirm_secs)
    }
}

impl BackendConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AggregatorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for BinanceEndpoints {
    fn default() -> Self {
        Self {
            spot_rest: default_binance_spot_rest(),
            futures_rest: default_binance_futures_rest(),
            futures_ws: default_binance_futures_ws(),
        }
    }
}

impl Default for BitgetEndpoints {
    fn default() -> Self {
        Self {
            rest: default_bitget_rest(),
            ws: default_bitget_ws(),
        }
    }
}

impl Default for BybitEndpoints {
    fn default() -> Self {
        Self {
            rest: default_bybit_rest(),
            ws: default_bybit_ws(),
        }
    }
}

impl Default for OkxEndpoints {
    fn default() -> Self {
        Self {
            rest: default_okx_rest(),
            ws: default_okx_ws(),
        }
    }
}

impl Default for HyperliquidEndpoints {
    fn default() -> Self {
        Self {
            rest: default_hyperliquid_rest(),
        }
    }
}

impl Default for AsterEndpoints {
    fn default() -> Self {
        Self {
            rest: default_aster_rest(),
            ws: default_aster_ws(),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_venues(),
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
            metadata_refresh_secs: default_metadata_refresh(),
            hyperliquid_poll_secs: default_hyperliquid_poll(),
            stream_confirm_secs: default_stream_confirm(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            refresh_interval_secs: default_cache_refresh(),
            bitget_pace_ms: default_bitget_pace(),
            binance_pace_ms: default_binance_pace(),
            aster_pace_ms: default_aster_pace(),
            aster_history_limit: default_aster_history_limit(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}
