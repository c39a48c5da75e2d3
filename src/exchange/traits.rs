//! Venue-agnostic adapter contract.
//!
//! Every venue exposes the same capability set regardless of how it gets its
//! data (REST snapshot + push stream, or REST polling):
//! - `init` / `destroy` lifecycle
//! - `table_data` normalized rows
//! - spot and margin listing predicates

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::error::ExchangeResult;

/// Venue identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    #[serde(alias = "binance")]
    Binance,
    #[serde(alias = "bitget")]
    Bitget,
    #[serde(alias = "bybit")]
    Bybit,
    #[serde(rename = "OKX", alias = "Okx", alias = "okx")]
    Okx,
    #[serde(alias = "hyperliquid")]
    Hyperliquid,
    #[serde(alias = "aster")]
    Aster,
}

impl Venue {
    pub const ALL: [Venue; 6] = [
        Venue::Hyperliquid,
        Venue::Okx,
        Venue::Bybit,
        Venue::Bitget,
        Venue::Binance,
        Venue::Aster,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Venue::Binance => "Binance",
            Venue::Bitget => "Bitget",
            Venue::Bybit => "Bybit",
            Venue::Okx => "OKX",
            Venue::Hyperliquid => "Hyperliquid",
            Venue::Aster => "Aster",
        }
    }

    /// Short code for display (2-3 chars).
    pub fn short_code(&self) -> &'static str {
        match self {
            Venue::Binance => "BN",
            Venue::Bitget => "BG",
            Venue::Bybit => "BB",
            Venue::Okx => "OKX",
            Venue::Hyperliquid => "HL",
            Venue::Aster => "AS",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Venue::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s) || v.short_code().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown venue '{}'", s))
    }
}

/// One normalized row: a perpetual on one venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuote {
    pub exchange: Venue,
    /// Base asset, quote suffix stripped (e.g. "BTC").
    pub symbol: String,
    /// Funding rate annualized over 365 days, in percent.
    #[serde(rename = "fundingRateAPR")]
    pub funding_rate_apr: f64,
    pub mark_price: f64,
    pub index_price: f64,
    /// Open interest in quote currency. `0` means unknown.
    #[serde(rename = "openInterestUSD")]
    pub open_interest_usd: f64,
}

impl NormalizedQuote {
    /// Equivalent funding per 8-hour period, in percent.
    pub fn rate_8h(&self) -> f64 {
        self.funding_rate_apr / 365.0 / 3.0
    }

    /// Equivalent funding per hour, in percent.
    pub fn rate_1h(&self) -> f64 {
        self.funding_rate_apr / 365.0 / 24.0
    }

    /// Mark-over-index premium relative to their midpoint, in percent.
    pub fn premium_pct(&self) -> f64 {
        let sum = self.mark_price + self.index_price;
        if sum == 0.0 {
            return 0.0;
        }
        (self.mark_price - self.index_price) / sum * 2.0 * 100.0
    }

    /// Whether open interest is known for this row.
    pub fn has_open_interest(&self) -> bool {
        self.open_interest_usd > 0.0
    }
}

/// Adapter lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    Uninitialized,
    /// REST baseline and stream handshake in progress.
    Connecting,
    /// Subscribed and receiving updates (or polling, for REST-only venues).
    Streaming,
    /// Destroyed, or the stream dropped. A dropped stream keeps serving stale rows.
    Closed,
}

/// Notification published by an adapter as its state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// A symbol's record changed (venue-native symbol).
    Updated { venue: Venue, symbol: String },
    /// A full REST snapshot replaced the state.
    Refreshed { venue: Venue },
    /// The push stream ended; rows are stale from here on.
    StreamClosed { venue: Venue, reason: String },
}

/// Capability set every venue adapter implements.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Returns the venue identifier.
    fn venue(&self) -> Venue;

    /// Load the REST baseline, open the push stream and subscribe.
    ///
    /// Resolves only once the stream is open and subscriptions are sent.
    /// Any failure is reported as [`ExchangeError::Init`](crate::error::ExchangeError::Init).
    async fn init(&self) -> ExchangeResult<()>;

    /// Close the stream and cancel timers. Late writes are discarded.
    async fn destroy(&self);

    /// Current phase of the adapter lifecycle.
    fn status(&self) -> AdapterStatus;

    /// Normalized rows derived from current state.
    ///
    /// Empty until `init()` resolves. Symbols missing a required field are
    /// skipped.
    fn table_data(&self) -> Vec<NormalizedQuote>;

    /// Whether `symbol` (base asset) trades on this venue's spot market.
    fn is_spot_available(&self, symbol: &str) -> bool;

    /// Whether `symbol` (base asset) can be traded on margin on this venue.
    fn is_margin_available(&self, symbol: &str) -> bool;

    /// Subscribe to state-change notifications.
    fn updates(&self) -> broadcast::Receiver<AdapterEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(mark: f64, index: f64) -> NormalizedQuote {
        NormalizedQuote {
            exchange: Venue::Binance,
            symbol: "BTC".to_string(),
            funding_rate_apr: 10.95,
            mark_price: mark,
            index_price: index,
            open_interest_usd: 0.0,
        }
    }

    #[test]
    fn test_derived_rates() {
        let q = quote(100.0, 100.0);
        assert!((q.rate_8h() - 0.01).abs() < 1e-12);
        assert!((q.rate_1h() - 0.00125).abs() < 1e-12);
        assert_eq!(q.premium_pct(), 0.0);
        assert!(!q.has_open_interest());
    }

    #[test]
    fn test_premium() {
        let q = quote(101.0, 99.0);
        assert!((q.premium_pct() - 2.0).abs() < 1e-12);
        assert_eq!(quote(0.0, 0.0).premium_pct(), 0.0);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(quote(1.0, 2.0)).unwrap();
        assert_eq!(json["exchange"], "Binance");
        assert!(json.get("fundingRateAPR").is_some());
        assert!(json.get("openInterestUSD").is_some());
        assert!(json.get("markPrice").is_some());
    }

    #[test]
    fn test_venue_display() {
        assert_eq!(Venue::Okx.to_string(), "OKX");
        assert_eq!(Venue::Hyperliquid.short_code(), "HL");
        let v: Venue = serde_json::from_str(r#""OKX""#).unwrap();
        assert_eq!(v, Venue::Okx);
    }

    #[test]
    fn test_venue_from_str() {
        assert_eq!("okx".parse::<Venue>(), Ok(Venue::Okx));
        assert_eq!("HL".parse::<Venue>(), Ok(Venue::Hyperliquid));
        assert!("ftx".parse::<Venue>().is_err());
    }
}
