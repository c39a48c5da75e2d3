//! Type definitions for Hyperliquid API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::decimal::{deserialize_decimal_str, deserialize_decimal_str_opt};

/// Request type for Hyperliquid info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Get metadata and asset contexts (funding rates, prices, OI).
    #[serde(rename = "metaAndAssetCtxs")]
    MetaAndAssetCtxs,

    /// Get spot token and pair metadata.
    #[serde(rename = "spotMeta")]
    SpotMeta,
}

/// Response from metaAndAssetCtxs endpoint.
/// Returns a tuple of (Meta, Vec<AssetCtx>).
pub type MetaAndAssetCtxsResponse = (Meta, Vec<AssetCtx>);

/// Universe metadata for perpetuals.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

/// Metadata for a single asset in the universe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Asset name (e.g., "BTC", "ETH")
    pub name: String,
    /// Size decimal precision
    pub sz_decimals: u8,
    /// Maximum allowed leverage
    pub max_leverage: u8,
    /// Whether only isolated margin is allowed
    #[serde(default)]
    pub only_isolated: bool,
    /// Delisted assets keep their slot in the universe
    #[serde(default)]
    pub is_delisted: bool,
}

/// Real-time context for an asset (prices, funding, volume).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    /// Current funding rate (hourly, as decimal string)
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub funding: Decimal,
    /// Open interest in coins
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub open_interest: Decimal,
    /// Oracle price
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub oracle_px: Decimal,
    /// Mark price
    #[serde(deserialize_with = "deserialize_decimal_str")]
    pub mark_px: Decimal,
    /// Daily notional volume
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub day_ntl_vlm: Option<Decimal>,
    /// Premium over oracle price (can be null for inactive coins)
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub premium: Option<Decimal>,
    /// Mid price (between best bid and ask, can be null for inactive coins)
    #[serde(default, deserialize_with = "deserialize_decimal_str_opt")]
    pub mid_px: Option<Decimal>,
}

/// Spot metadata: tokens and the pairs built from them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotMeta {
    pub universe: Vec<SpotPair>,
    pub tokens: Vec<SpotToken>,
}

/// Spot pair; `tokens` holds `[base, quote]` token indices.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotPair {
    pub name: String,
    pub tokens: Vec<usize>,
    pub index: usize,
    #[serde(default)]
    pub is_canonical: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotToken {
    pub name: String,
    pub index: usize,
    #[serde(default)]
    pub sz_decimals: u8,
}

impl SpotMeta {
    /// Base token names of every pair quoted in `quote`.
    pub fn bases_quoted_in(&self, quote: &str) -> Vec<String> {
        let name_of = |idx: usize| {
            self.tokens
                .iter()
                .find(|t| t.index == idx)
                .map(|t| t.name.as_str())
        };
        self.universe
            .iter()
            .filter_map(|pair| match pair.tokens.as_slice() {
                [base, q] if name_of(*q) == Some(quote) => name_of(*base).map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

/// Combined asset data with metadata and context.
#[derive(Debug, Clone)]
pub struct HyperliquidAsset {
    /// Asset name/symbol
    pub name: String,
    /// Current hourly funding rate
    pub funding_rate: Decimal,
    /// Open interest in coins
    pub open_interest: Decimal,
    /// Oracle price
    pub oracle_price: Decimal,
    /// Mark price
    pub mark_price: Decimal,
    pub is_delisted: bool,
}
