//! Hyperliquid exchange integration.
//!
//! # Funding Rate Notes
//!
//! Hyperliquid funding is paid **hourly** at 1/8th of the computed 8-hour rate.
//! This differs from most CEXs which pay every 8 hours, so rows are annualized
//! from a 1-hour period.

mod adapter;
mod client;
pub mod state;
mod types;

pub use adapter::HyperliquidAdapter;
pub use client::HyperliquidClient;
pub use types::*;
