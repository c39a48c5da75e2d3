//! # Funding Rate Aggregator
//!
//! Aggregates perpetual-futures funding rates, mark and index prices, open
//! interest and spot/margin listings from several exchanges into one view
//! ranked by annualized funding rate.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Per-venue adapters (REST baseline + push stream)
//! - `backend`: Polling caches for rate-limited REST data, served over HTTP
//! - `aggregator`: Cross-venue merge, ranking and availability sets
//! - `utils`: Decimal parsing, normalization, clocks and timers

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod error;
pub mod exchange;
pub mod utils;

pub use config::Config;
pub use error::{ExchangeError, ExchangeResult};
